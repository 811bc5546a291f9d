//! Error types for the media-relay application.

use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Session expired for account: {0}")]
    SessionExpired(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Browser automation error: {0}")]
    Browser(String),

    // Discovery errors
    #[error("Discovery failed: {0}")]
    Discovery(String),

    // Download errors
    #[error("Download failed: {0}")]
    Download(String),

    #[error("No media URL could be extracted from the detail page")]
    Extraction,

    #[error("Could not determine file size for: {0}")]
    SizeUnknown(String),

    #[error("Server does not satisfy range requests")]
    RangeNotSatisfiable,

    // Upload errors
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Upload rejected by destination: {0}")]
    UploadRejected(String),

    // RPC errors
    #[error("RPC call timed out on channel: {0}")]
    RpcTimeout(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    // Queue errors
    #[error("Queue error: {0}")]
    Queue(String),

    // File system errors
    #[error("Invalid filename (path traversal attempt): {0}")]
    InvalidFilename(String),

    // External tool errors
    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("FFmpeg not found. Please install ffmpeg and ensure it's in your PATH.")]
    FFmpegNotFound,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ABORT: i32 = 1;
    pub const AUTH_ERROR: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const PIPELINE_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
}
