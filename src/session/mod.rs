//! Session module.
//!
//! This module provides:
//! - Cookie and credentials file codecs
//! - Browser-driven login automation
//! - Per-account session caching and validation

pub mod browser;
pub mod cookies;
pub mod manager;

pub use cookies::{parse_cookie_file, parse_credentials_file};
pub use manager::{Session, SessionManager};
