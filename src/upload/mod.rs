//! Upload module.
//!
//! This module provides:
//! - Signed upload parameter fetch
//! - Manual streaming multipart framing
//! - Retried CDN transfers with smoothed speed reporting

pub mod engine;
pub mod multipart;
pub mod params;

pub use engine::{run_upload, UploadRequest};
pub use multipart::MultipartUpload;
pub use params::{fetch_upload_params, UploadParams};
