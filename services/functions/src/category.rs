use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Category tag assigned to a saved link based on its host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkCategory {
    Instagram,
    YouTube,
    Twitter,
    Facebook,
    TikTok,
    LinkedIn,
    GitHub,
    Reddit,
    Pinterest,
    Website,
    Unknown,
}

/// Domains checked in order; a host matches its domain or any subdomain of it
const HOST_RULES: &[(&[&str], LinkCategory)] = &[
    (&["instagram.com"], LinkCategory::Instagram),
    (&["youtube.com", "youtu.be"], LinkCategory::YouTube),
    (&["twitter.com", "x.com"], LinkCategory::Twitter),
    (&["facebook.com"], LinkCategory::Facebook),
    (&["tiktok.com"], LinkCategory::TikTok),
    (&["linkedin.com"], LinkCategory::LinkedIn),
    (&["github.com"], LinkCategory::GitHub),
    (&["reddit.com"], LinkCategory::Reddit),
    (&["pinterest.com"], LinkCategory::Pinterest),
];

/// Detect the category of a URL from its host
pub fn detect_category(url: &str) -> LinkCategory {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return LinkCategory::Unknown;
    };

    HOST_RULES
        .iter()
        .find(|(domains, _)| domains.iter().any(|d| host_matches(&host, d)))
        .map(|(_, category)| *category)
        .unwrap_or(LinkCategory::Website)
}

pub(crate) fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkCategory::Instagram => "Instagram",
            LinkCategory::YouTube => "YouTube",
            LinkCategory::Twitter => "Twitter",
            LinkCategory::Facebook => "Facebook",
            LinkCategory::TikTok => "TikTok",
            LinkCategory::LinkedIn => "LinkedIn",
            LinkCategory::GitHub => "GitHub",
            LinkCategory::Reddit => "Reddit",
            LinkCategory::Pinterest => "Pinterest",
            LinkCategory::Website => "Website",
            LinkCategory::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}
