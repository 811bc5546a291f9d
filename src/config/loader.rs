//! Configuration structures and loading logic.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub origin: OriginConfig,

    #[serde(default)]
    pub accounts: AccountsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub watermark: WatermarkConfig,
}

/// Origin site endpoints and authentication markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Base URL of the hosting site, e.g. "https://www.example-host.com".
    pub base_url: String,

    /// Path of the login form relative to the base URL.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Marker string present in page bodies only when authenticated.
    #[serde(default = "default_authenticated_marker")]
    pub authenticated_marker: String,

    /// Cookie names that must be present after a successful login.
    #[serde(default = "default_required_cookies")]
    pub required_cookies: Vec<String>,

    /// Path of the upload-parameter endpoint relative to the base URL.
    #[serde(default = "default_upload_prepare_path")]
    pub upload_prepare_path: String,

    /// Browser user agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Account storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Directory scanned for `<id>.cookies` / `<id>.credentials` files.
    #[serde(default = "default_accounts_directory")]
    pub directory: PathBuf,
}

/// Local storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for downloaded media.
    #[serde(default)]
    pub download_directory: Option<PathBuf>,

    /// Queue persistence file.
    #[serde(default = "default_queue_file")]
    pub queue_file: PathBuf,
}

/// Transfer tuning values.
///
/// Product tuning knobs, not invariants; the defaults mirror the shipped
/// behavior but every one of them can be overridden in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Reject media smaller than this many bytes (preview-sized files).
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,

    /// Reject media larger than this many bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Byte size of one download chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Maximum concurrent in-flight chunk requests.
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,

    /// Attempts per chunk before the download fails.
    #[serde(default = "default_chunk_retries")]
    pub chunk_retries: u32,

    /// Seconds before a single chunk request is abandoned.
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_secs: u64,

    /// Seconds before a full streaming download is abandoned.
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,

    /// Attempts for the CDN upload transfer.
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,

    /// Fixed delay between upload attempts, in seconds.
    #[serde(default = "default_upload_retry_delay")]
    pub upload_retry_delay_secs: u64,

    /// Discovery stops after scanning this multiple of the target count.
    #[serde(default = "default_buffer_multiplier")]
    pub buffer_multiplier: u32,

    /// Pages fetched per listing view before moving on.
    #[serde(default = "default_max_pages_per_view")]
    pub max_pages_per_view: u32,

    /// Base delay between listing page fetches, in milliseconds.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Seconds an RPC call waits for the host before timing out.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

/// Optional watermark post-processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatermarkConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Text drawn onto the video.
    #[serde(default)]
    pub text: String,
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_authenticated_marker() -> String {
    "/logout".to_string()
}

fn default_required_cookies() -> Vec<String> {
    vec!["PHPSESSID".to_string()]
}

fn default_upload_prepare_path() -> String {
    "/upload/prepare".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36".to_string()
}

fn default_accounts_directory() -> PathBuf {
    PathBuf::from("accounts")
}

fn default_queue_file() -> PathBuf {
    PathBuf::from("queue.json")
}

fn default_min_file_size() -> u64 {
    300_000_000
}

fn default_max_file_size() -> u64 {
    20_000_000_000
}

fn default_chunk_size() -> u64 {
    1024 * 1024
}

fn default_chunk_concurrency() -> usize {
    2
}

fn default_chunk_retries() -> u32 {
    3
}

fn default_chunk_timeout() -> u64 {
    120
}

fn default_stream_timeout() -> u64 {
    600
}

fn default_upload_attempts() -> u32 {
    5
}

fn default_upload_retry_delay() -> u64 {
    3
}

fn default_buffer_multiplier() -> u32 {
    6
}

fn default_max_pages_per_view() -> u32 {
    10
}

fn default_page_delay() -> u64 {
    1500
}

fn default_rpc_timeout() -> u64 {
    30
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            directory: default_accounts_directory(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_file_size: default_min_file_size(),
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
            chunk_concurrency: default_chunk_concurrency(),
            chunk_retries: default_chunk_retries(),
            chunk_timeout_secs: default_chunk_timeout(),
            stream_timeout_secs: default_stream_timeout(),
            upload_attempts: default_upload_attempts(),
            upload_retry_delay_secs: default_upload_retry_delay(),
            buffer_multiplier: default_buffer_multiplier(),
            max_pages_per_view: default_max_pages_per_view(),
            page_delay_ms: default_page_delay(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}. Create one from config.example.toml",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the effective download directory.
    pub fn download_directory(&self) -> PathBuf {
        self.storage
            .download_directory
            .clone()
            .unwrap_or_else(crate::fs::paths::default_download_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [origin]
            base_url = "https://host.example"
            "#,
        )
        .unwrap();

        assert_eq!(config.origin.login_path, "/login");
        assert_eq!(config.limits.chunk_size, 1024 * 1024);
        assert_eq!(config.limits.chunk_concurrency, 2);
        assert_eq!(config.limits.min_file_size, 300_000_000);
        assert_eq!(config.limits.buffer_multiplier, 6);
        assert!(!config.watermark.enabled);
    }

    #[test]
    fn test_limits_are_overridable() {
        let config: Config = toml::from_str(
            r#"
            [origin]
            base_url = "https://host.example"

            [limits]
            min_file_size = 1000
            chunk_concurrency = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.min_file_size, 1000);
        assert_eq!(config.limits.chunk_concurrency, 8);
        assert_eq!(config.limits.max_file_size, 20_000_000_000);
    }
}
