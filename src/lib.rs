//! media-relay - hosting-site to CDN mirroring pipeline.
//!
//! This library automates acquisition and redistribution of media files
//! from a third-party hosting site: discover candidates, authenticate as
//! an account, download with parallel range-based chunking, then stream
//! the file back out to a destination CDN.
//!
//! # Features
//!
//! - Paginated, deduplicated candidate discovery
//! - Cookie/credential session management with headless-browser login
//! - Chunked downloads with bounded concurrency and full-stream fallback
//! - Manual streaming multipart uploads with bounded retries
//! - A two-phase queue orchestrator running each engine in an isolated
//!   execution unit, bridged back to the host over correlated RPC
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use media_relay::{AccountStore, Config, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let accounts = Arc::new(AccountStore::scan(&config.accounts.directory).await?);
//!     let sessions = SessionManager::new(
//!         reqwest::Client::new(),
//!         config.origin.clone(),
//!         accounts,
//!     );
//!
//!     // ... queue logic
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod cli;
pub mod config;
pub mod discover;
pub mod download;
pub mod error;
pub mod events;
pub mod fs;
pub mod output;
pub mod queue;
pub mod rpc;
pub mod session;
pub mod upload;

// Re-exports for convenience
pub use accounts::{Account, AccountStore};
pub use config::Config;
pub use discover::{Candidate, DiscoverRequest};
pub use download::{DownloadOutcome, DownloadRequest};
pub use error::{Error, Result};
pub use events::EngineEvent;
pub use queue::{Orchestrator, QueueCommand, QueueItem};
pub use session::SessionManager;
pub use upload::UploadRequest;
