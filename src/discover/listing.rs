//! Listing page parsing.

use scraper::{Html, Selector};
use url::Url;

use crate::discover::Candidate;
use crate::error::{Error, Result};

/// A listing view scanned during discovery.
#[derive(Debug, Clone, Copy)]
pub struct ListingView {
    pub label: &'static str,
    pub path: &'static str,
}

/// Views scanned in order: most viewed over three windows.
pub const LISTING_VIEWS: &[ListingView] = &[
    ListingView {
        label: "most viewed (all time)",
        path: "/videos?o=mv",
    },
    ListingView {
        label: "most viewed (7 days)",
        path: "/videos?o=mv&t=w",
    },
    ListingView {
        label: "most viewed (14 days)",
        path: "/videos?o=mv&t=2w",
    },
];

/// Build the URL for one page of a listing view.
pub fn page_url(base_url: &str, view: &ListingView, page: u32) -> String {
    let separator = if view.path.contains('?') { '&' } else { '?' };
    format!("{}{}{}page={}", base_url, view.path, separator, page)
}

/// Parse one listing page into candidates.
///
/// Each candidate is read from a single self-contained item fragment;
/// fields are never mixed across fragments. Fragments without a link are
/// dropped.
pub fn parse_listing_page(html: &str, base_url: &str) -> Result<Vec<Candidate>> {
    let document = Html::parse_document(html);

    let item_selector = selector(".video-item")?;
    let link_selector = selector("a[href]")?;
    let title_selector = selector(".title")?;
    let thumb_selector = selector("img[src]")?;
    let size_selector = selector(".size")?;

    let base = Url::parse(base_url)?;
    let mut candidates = Vec::new();

    for fragment in document.select(&item_selector) {
        let Some(link) = fragment.select(&link_selector).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            continue;
        };

        let title = fragment
            .select(&title_selector)
            .next()
            .map(|t| t.text().collect::<String>())
            .or_else(|| link.value().attr("title").map(str::to_string))
            .map(|t| normalize_title(&t))
            .unwrap_or_default();

        let thumbnail = fragment
            .select(&thumb_selector)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| base.join(src).ok())
            .map(|u| u.to_string());

        let size = fragment
            .select(&size_selector)
            .next()
            .map(|s| s.text().collect::<String>())
            .and_then(|text| parse_human_size(&text));

        candidates.push(Candidate {
            url: url.to_string(),
            title,
            thumbnail,
            size,
        });
    }

    Ok(candidates)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Discovery(format!("Bad selector '{}': {}", css, e)))
}

/// Collapse whitespace runs in a scraped title.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert a human-readable size ("1.4 GB") to bytes.
pub fn parse_human_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number.trim().parse().ok()?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" | "KIB" => 1024,
        "MB" | "MIB" => 1024 * 1024,
        "GB" | "GIB" => 1024 * 1024 * 1024,
        "TB" | "TIB" => 1024_u64.pow(4),
        _ => return None,
    };

    if value < 0.0 {
        return None;
    }

    Some((value * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_HTML: &str = r#"
        <html><body>
        <div class="video-item">
            <a href="/video/111"><span class="title">First  Video</span></a>
            <img src="/thumbs/111.jpg">
            <span class="size">1.5 GB</span>
        </div>
        <div class="video-item">
            <a href="/video/222" title="Second Video"></a>
            <span class="size">700 MB</span>
        </div>
        <div class="video-item">
            <span class="title">No link, dropped</span>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_page() {
        let candidates = parse_listing_page(LISTING_HTML, "https://host.example").unwrap();
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.url, "https://host.example/video/111");
        assert_eq!(first.title, "First Video");
        assert_eq!(
            first.thumbnail.as_deref(),
            Some("https://host.example/thumbs/111.jpg")
        );
        assert_eq!(first.size, Some((1.5 * 1024.0 * 1024.0 * 1024.0) as u64));

        let second = &candidates[1];
        assert_eq!(second.title, "Second Video");
        assert!(second.thumbnail.is_none());
    }

    #[test]
    fn test_fields_come_from_the_same_fragment() {
        // The second fragment has no <img>; it must not inherit the
        // first fragment's thumbnail.
        let candidates = parse_listing_page(LISTING_HTML, "https://host.example").unwrap();
        assert!(candidates[1].thumbnail.is_none());
    }

    #[test]
    fn test_parse_human_size() {
        assert_eq!(parse_human_size("512 B"), Some(512));
        assert_eq!(parse_human_size("2 KB"), Some(2048));
        assert_eq!(parse_human_size("700 MB"), Some(700 * 1024 * 1024));
        assert_eq!(parse_human_size("1.5GB"), Some((1.5 * 1073741824.0) as u64));
        assert_eq!(parse_human_size("garbage"), None);
        assert_eq!(parse_human_size(""), None);
    }

    #[test]
    fn test_page_url() {
        let view = &LISTING_VIEWS[0];
        assert_eq!(
            page_url("https://host.example", view, 3),
            "https://host.example/videos?o=mv&page=3"
        );
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  a \n b\t c "), "a b c");
    }
}
