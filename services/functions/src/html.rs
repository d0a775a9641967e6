//! Pattern-based scraping helpers for unstructured HTML.
//!
//! Meta tags are visited in document order and their attributes are read
//! independently of the order they are written in, so
//! `<meta property="og:image" content="...">` and
//! `<meta content="..." property="og:image">` resolve the same way.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Any `<meta ...>` tag
static META_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());

/// `name="value"` or `name='value'` inside a tag
static ATTRIBUTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Carousel image URLs embedded in inline JSON
static DISPLAY_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""display_url":"([^"]+)""#).unwrap());

/// Character references: decimal, hex, and the named ones we recognise
static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#([0-9]+)|#[xX]([0-9A-Fa-f]+)|(amp|lt|gt|quot|apos));").unwrap()
});

/// Content of the first `<meta>` tag whose `property` or `name` equals `key`.
///
/// Tags with an empty `content` are skipped.
pub fn extract_meta_content(html: &str, key: &str) -> Option<String> {
    META_TAG_REGEX.find_iter(html).find_map(|tag| {
        let mut matches_key = false;
        let mut content = None;

        for attr in ATTRIBUTE_REGEX.captures_iter(tag.as_str()) {
            let name = &attr[1];
            let value = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());

            if name.eq_ignore_ascii_case("content") {
                content = Some(value);
            } else if (name.eq_ignore_ascii_case("property") || name.eq_ignore_ascii_case("name"))
                && value.eq_ignore_ascii_case(key)
            {
                matches_key = true;
            }
        }

        if matches_key {
            content.filter(|c| !c.is_empty()).map(str::to_string)
        } else {
            None
        }
    })
}

/// Every `"display_url":"..."` value in document order, with `&` unescaped
pub fn extract_display_urls(html: &str) -> Vec<String> {
    DISPLAY_URL_REGEX
        .captures_iter(html)
        .map(|c| c[1].replace("\\u0026", "&"))
        .collect()
}

/// Decode HTML character references in a single left-to-right pass.
///
/// Decoded text is never rescanned, so `&amp;lt;` becomes `&lt;`.
/// References to invalid code points are left as written.
pub fn decode_html_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &Captures| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|named| match named.as_str() {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => None,
                })
            };

            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
