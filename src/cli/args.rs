//! Command-line argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;

/// media-relay CLI.
#[derive(Parser, Debug)]
#[command(
    name = "media-relay",
    version,
    about = "Mirror media from a hosting site to a destination CDN",
    long_about = "A pipeline that discovers candidate media on a hosting site, downloads it \
                  with chunked transfers, and re-uploads it to a destination CDN.\n\n\
                  Accounts are defined by cookie/credential files in the accounts directory."
)]
pub struct Args {
    /// Operation to perform.
    #[arg(long, value_enum, default_value_t = ModeArg::Run)]
    pub mode: ModeArg,

    /// Path to configuration file.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Account id to act as (defaults to the first active account).
    #[arg(short, long, env = "MEDIA_RELAY_ACCOUNT")]
    pub account: Option<String>,

    /// Number of candidates to gather in discover mode.
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Also enqueue discovered candidates into the persisted queue.
    #[arg(long)]
    pub enqueue: bool,

    /// Detail-page URL to enqueue before running the queue.
    #[arg(long)]
    pub source: Option<String>,

    /// Local file for direct upload mode.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Base directory for downloads.
    #[arg(short = 'd', long = "directory")]
    pub download_directory: Option<PathBuf>,

    /// Directory containing account cookie/credential files.
    #[arg(long)]
    pub accounts_dir: Option<PathBuf>,

    /// Maximum concurrent chunk requests per download.
    #[arg(long)]
    pub chunk_concurrency: Option<usize>,

    /// Hide progress output.
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

/// CLI operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Process the persisted queue (download then upload per item).
    Run,
    /// Scan listing views for new candidates.
    Discover,
    /// Upload a local file directly.
    Upload,
    /// Validate the account's session against the origin.
    CheckAuth,
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) {
        if let Some(ref dir) = self.download_directory {
            config.storage.download_directory = Some(dir.clone());
        }

        if let Some(ref dir) = self.accounts_dir {
            config.accounts.directory = dir.clone();
        }

        if let Some(concurrency) = self.chunk_concurrency {
            config.limits.chunk_concurrency = concurrency;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_only_provided_values() {
        let mut config: Config = toml::from_str(
            r#"
            [origin]
            base_url = "https://host.example"
            "#,
        )
        .unwrap();

        let args = Args::parse_from([
            "media-relay",
            "--mode",
            "discover",
            "--chunk-concurrency",
            "4",
        ]);
        args.merge_into_config(&mut config);

        assert_eq!(config.limits.chunk_concurrency, 4);
        assert!(config.storage.download_directory.is_none());
        assert_eq!(args.mode, ModeArg::Discover);
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["media-relay"]);
        assert_eq!(args.mode, ModeArg::Run);
        assert_eq!(args.count, 10);
        assert!(!args.enqueue);
    }
}
