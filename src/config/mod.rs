//! Configuration module for media-relay.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - CLI argument parsing and merging
//! - Configuration validation

pub mod loader;
pub mod validation;

pub use loader::{
    AccountsConfig, Config, LimitsConfig, OriginConfig, StorageConfig, WatermarkConfig,
};
pub use validation::validate_config;
