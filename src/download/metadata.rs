//! Media URL and size resolution.
//!
//! The detail page embeds the playable URL in one of several shapes
//! depending on template age. Extraction is an ordered list of named
//! strategies; the first one to yield a URL wins, and new strategies can
//! be appended without touching the control flow.

use regex::Regex;
use reqwest::header;
use reqwest::Client;
use scraper::{Html, Selector};

use crate::error::{Error, Result};

/// One way of digging a media URL out of detail-page HTML.
pub struct ExtractionStrategy {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<String>,
}

/// Strategies in evaluation order.
pub const STRATEGIES: &[ExtractionStrategy] = &[
    ExtractionStrategy {
        name: "structured-meta",
        extract: extract_meta_tag,
    },
    ExtractionStrategy {
        name: "direct-pattern",
        extract: extract_direct_pattern,
    },
    ExtractionStrategy {
        name: "source-attributes",
        extract: extract_source_attributes,
    },
    ExtractionStrategy {
        name: "player-config",
        extract: extract_player_config,
    },
];

/// Substrings that mark a URL as a thumbnail or poster, not media.
const IMAGE_MARKERS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif", "thumb", "preview"];

/// Resolve a playable media URL from detail-page HTML.
pub fn resolve_media_url(html: &str) -> Option<String> {
    for strategy in STRATEGIES {
        if let Some(url) = (strategy.extract)(html) {
            tracing::debug!("Media URL resolved by strategy: {}", strategy.name);
            return Some(url);
        }
    }
    None
}

/// Append the "download intent" query flag to a detail-page URL.
pub fn with_download_intent(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}download=1", url, separator)
}

fn extract_meta_tag(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selectors = [
        "meta[property='og:video']",
        "meta[property='og:video:url']",
        "meta[itemprop='contentURL']",
    ];

    for css in selectors {
        let selector = Selector::parse(css).ok()?;
        if let Some(tag) = document.select(&selector).next() {
            if let Some(content) = tag.value().attr("content") {
                if !content.is_empty() {
                    return Some(content.to_string());
                }
            }
        }
    }
    None
}

fn extract_direct_pattern(html: &str) -> Option<String> {
    let pattern = Regex::new(r#"https?://[^"'\s<>]+\.(?:mp4|m4v|webm)[^"'\s<>]*"#).unwrap();
    pattern.find(html).map(|m| m.as_str().to_string())
}

fn extract_source_attributes(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selectors = ["[data-video-url]", "[data-src]", "video source[src]"];
    let attrs = ["data-video-url", "data-src", "src"];

    for css in selectors {
        let selector = Selector::parse(css).ok()?;
        for element in document.select(&selector) {
            for attr in attrs {
                let Some(value) = element.value().attr(attr) else {
                    continue;
                };
                let lower = value.to_ascii_lowercase();
                if IMAGE_MARKERS.iter().any(|marker| lower.contains(marker)) {
                    continue;
                }
                if value.starts_with("http") {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn extract_player_config(html: &str) -> Option<String> {
    let pattern =
        Regex::new(r#"(?:video_url|videoUrl|file)\s*[:=]\s*["']([^"']+)["']"#).unwrap();
    pattern
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolve the media size with a one-byte range probe.
///
/// Prefers the `Content-Range` total; falls back to `Content-Length`
/// when the server ignores the range. Returns Ok(None) when neither
/// yields a size.
pub async fn probe_size(client: &Client, url: &str, cookies: &str) -> Result<Option<u64>> {
    let response = client
        .get(url)
        .header(header::RANGE, "bytes=0-0")
        .header(header::COOKIE, cookies)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "Size probe failed: HTTP {}",
            response.status()
        )));
    }

    if let Some(total) = response
        .headers()
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
    {
        return Ok(Some(total));
    }

    // Server ignored the range and returned the whole resource.
    if response.status() == reqwest::StatusCode::OK {
        return Ok(response.content_length());
    }

    Ok(None)
}

/// Parse the total from a `Content-Range: bytes 0-0/12345` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_tag_strategy() {
        let html = r#"<html><head>
            <meta property="og:video" content="https://cdn.example/v/1.mp4">
        </head></html>"#;
        assert_eq!(
            resolve_media_url(html).unwrap(),
            "https://cdn.example/v/1.mp4"
        );
    }

    #[test]
    fn test_direct_pattern_strategy() {
        let html = r#"<script>play("https://cdn.example/media/2.mp4?token=x")</script>"#;
        assert_eq!(
            resolve_media_url(html).unwrap(),
            "https://cdn.example/media/2.mp4?token=x"
        );
    }

    #[test]
    fn test_source_attribute_strategy_skips_images() {
        let html = r#"<div data-src="https://cdn.example/thumbs/3.jpg"></div>
                      <video><source src="https://cdn.example/v/3.webm"></video>"#;
        assert_eq!(
            resolve_media_url(html).unwrap(),
            "https://cdn.example/v/3.webm"
        );
    }

    #[test]
    fn test_player_config_strategy() {
        let html = r#"<script>player.setup({ video_url: "https://cdn.example/v/4" })</script>"#;
        assert_eq!(
            resolve_media_url(html).unwrap(),
            "https://cdn.example/v/4"
        );
    }

    #[test]
    fn test_strategy_order_first_wins() {
        // Both a meta tag and a player config are present; the meta tag
        // strategy runs first.
        let html = r#"<meta property="og:video" content="https://cdn.example/meta.mp4">
                      <script>file: 'https://cdn.example/config.mp4'</script>"#;
        assert_eq!(
            resolve_media_url(html).unwrap(),
            "https://cdn.example/meta.mp4"
        );
    }

    #[test]
    fn test_no_strategy_matches() {
        assert!(resolve_media_url("<html><body>nothing here</body></html>").is_none());
    }

    #[test]
    fn test_with_download_intent() {
        assert_eq!(
            with_download_intent("https://host.example/video/1"),
            "https://host.example/video/1?download=1"
        );
        assert_eq!(
            with_download_intent("https://host.example/video/1?hd=1"),
            "https://host.example/video/1?hd=1&download=1"
        );
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/12345"), Some(12345));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
