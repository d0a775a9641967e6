//! Link metadata fetching.
//!
//! Instagram links are resolved through the oEmbed endpoint first; every
//! other link, and any Instagram link whose oEmbed lookup fails for whatever
//! reason, is resolved by scraping Open Graph / Twitter card meta tags.

use crate::category::{detect_category, host_matches, LinkCategory};
use crate::error::{FetchError, FunctionError};
use crate::html::{decode_html_entities, extract_meta_content};
use crate::http_client::HttpClient;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// `<author> on Instagram: "<caption>"` with straight or curly quotes
static INSTAGRAM_TITLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^(.+?)\s+on\s+Instagram:\s*["\x{201C}\x{201D}](.+?)["\x{201C}\x{201D}]?$"#)
        .unwrap()
});

/// Best-effort metadata for a link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataResult {
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub category: LinkCategory,
}

/// Metadata paired with the error that cut the lookup short, if any
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataOutcome {
    pub result: MetadataResult,
    pub error: Option<String>,
}

/// Author and caption split out of an Instagram post title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstagramTitle {
    pub author: String,
    pub caption: String,
}

#[derive(Debug, Default, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

/// Resolves title and thumbnail for arbitrary URLs
pub struct MetadataFetcher {
    http: Arc<dyn HttpClient>,
    oembed_endpoint: String,
    user_agent: String,
}

impl MetadataFetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        oembed_endpoint: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http,
            oembed_endpoint: oembed_endpoint.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Fetch metadata, folding any failure into an empty result plus message
    pub async fn fetch_metadata(&self, url: &str) -> MetadataOutcome {
        metrics::counter!("functions.metadata.requests").increment(1);

        match self.try_fetch_metadata(url).await {
            Ok(result) => MetadataOutcome {
                result,
                error: None,
            },
            Err(e) => {
                warn!(url = %url, error = %e, "Metadata lookup failed");
                MetadataOutcome {
                    result: MetadataResult {
                        title: None,
                        thumbnail_url: None,
                        category: detect_category(url),
                    },
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Fetch metadata, surfacing the first fatal error
    #[instrument(skip(self))]
    pub async fn try_fetch_metadata(&self, url: &str) -> Result<MetadataResult, FunctionError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let category = detect_category(url);

        if is_instagram_host(&parsed) {
            if let Some(result) = self.fetch_oembed(url, category).await {
                return Ok(result);
            }
            metrics::counter!("functions.metadata.oembed_fallbacks").increment(1);
        }

        let html = self.http.get_text(url, &self.user_agent).await?;

        let thumbnail = extract_meta_content(&html, "og:image")
            .or_else(|| extract_meta_content(&html, "twitter:image"));
        let title = extract_meta_content(&html, "og:title");

        debug!(
            found_title = title.is_some(),
            found_thumbnail = thumbnail.is_some(),
            "Scraped meta tags"
        );

        Ok(MetadataResult {
            title: title.map(|t| format_title(&decode_html_entities(&t))),
            thumbnail_url: thumbnail.map(|t| decode_html_entities(&t)),
            category,
        })
    }

    /// oEmbed lookup; any failure yields `None` so the caller can scrape instead
    async fn fetch_oembed(&self, url: &str, category: LinkCategory) -> Option<MetadataResult> {
        let endpoint = match Url::parse_with_params(&self.oembed_endpoint, &[("url", url)]) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(error = %e, "Invalid oEmbed endpoint, falling back to meta scraping");
                return None;
            }
        };

        let body = match self.http.get_text(endpoint.as_str(), &self.user_agent).await {
            Ok(body) => body,
            Err(e) => {
                info!(error = %e, "Instagram oEmbed failed, falling back to meta scraping");
                return None;
            }
        };

        let data: OEmbedResponse = match serde_json::from_str(&body) {
            Ok(data) => data,
            Err(e) => {
                info!(error = %e, "Unreadable oEmbed response, falling back to meta scraping");
                return None;
            }
        };

        let title = non_empty(data.title).or_else(|| non_empty(data.author_name));
        let thumbnail = non_empty(data.thumbnail_url);

        Some(MetadataResult {
            title: title.map(|t| format_title(&decode_html_entities(&t))),
            thumbnail_url: thumbnail.map(|t| decode_html_entities(&t)),
            category,
        })
    }
}

fn is_instagram_host(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| host_matches(&host.to_ascii_lowercase(), "instagram.com"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Split an already-decoded Instagram title into author and caption.
///
/// Titles that don't follow the Instagram pattern come back whole as the
/// caption with an empty author.
pub fn parse_instagram_title(title: &str) -> InstagramTitle {
    match INSTAGRAM_TITLE_REGEX.captures(title) {
        Some(caps) => InstagramTitle {
            author: caps[1].trim().to_string(),
            caption: caps[2].trim().to_string(),
        },
        None => InstagramTitle {
            author: String::new(),
            caption: title.to_string(),
        },
    }
}

/// Rewrite Instagram-style titles as `<author>: <caption>`
fn format_title(decoded: &str) -> String {
    let parsed = parse_instagram_title(decoded);
    if parsed.author.is_empty() {
        parsed.caption
    } else {
        format!("{}: {}", parsed.author, parsed.caption)
    }
}
