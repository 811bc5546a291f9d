//! Download module.
//!
//! This module provides:
//! - Media URL and size resolution from detail pages
//! - Chunk planning and bounded-concurrency range downloads
//! - Full-stream fallback transfers
//! - Speed/ETA estimation
//! - Optional watermark post-processing

pub mod chunks;
pub mod engine;
pub mod metadata;
pub mod rate;
pub mod stream;
pub mod watermark;

pub use chunks::{plan_chunks, Chunk};
pub use engine::{run_download, DownloadOutcome, DownloadRequest, SkipReason};
pub use metadata::resolve_media_url;
