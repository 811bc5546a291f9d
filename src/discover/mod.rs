//! Discovery module.
//!
//! Scans the origin's listing views for candidate media items, skipping
//! anything already processed and stopping once enough fresh candidates
//! are buffered.

pub mod engine;
pub mod listing;

pub use engine::{discover, DiscoverRequest};
pub use listing::{parse_human_size, parse_listing_page};

/// A discovered, not-yet-queued media item.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub size: Option<u64>,
}
