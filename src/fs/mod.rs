//! Filesystem module.
//!
//! Provides:
//! - Storage path resolution
//! - Filename sanitization and temp-file naming

pub mod paths;

pub use paths::{
    default_download_directory, ensure_dir, filename_for_title, part_path, sanitize_filename,
};
