//! Queue item model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::discover::Candidate;

/// Lifecycle status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Paused,
}

/// The two phases an item moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Download,
    Upload,
}

/// The media an item refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    /// Detail page URL; absent for direct local-file uploads.
    pub url: Option<String>,
    pub thumbnail: Option<String>,
}

/// One entry in the relay queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub video: VideoInfo,
    pub account_id: String,
    pub status: ItemStatus,
    pub phase: Phase,
    /// Finer-grained engine state ("resolving", "watermarking", ...).
    pub sub_phase: Option<String>,
    pub priority: u32,
    pub size: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
    pub progress: f64,
    pub error: Option<String>,
    /// Local file produced by the download phase, or supplied directly.
    pub file_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Promote a discovered candidate into the queue.
    pub fn from_candidate(candidate: &Candidate, account_id: &str, priority: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            video: VideoInfo {
                title: candidate.title.clone(),
                url: Some(candidate.url.clone()),
                thumbnail: candidate.thumbnail.clone(),
            },
            account_id: account_id.to_string(),
            status: ItemStatus::Pending,
            phase: Phase::Download,
            sub_phase: None,
            priority,
            size: candidate.size,
            speed: None,
            eta: None,
            progress: 0.0,
            error: None,
            file_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enqueue a local file for direct upload.
    pub fn from_local_file(path: PathBuf, account_id: &str, priority: u32) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            video: VideoInfo {
                title,
                url: None,
                thumbnail: None,
            },
            account_id: account_id.to_string(),
            status: ItemStatus::Pending,
            phase: Phase::Upload,
            sub_phase: None,
            priority,
            size: None,
            speed: None,
            eta: None,
            progress: 0.0,
            error: None,
            file_path: Some(path),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Mark the item failed; the recorded reason is never empty.
    pub fn mark_failed(&mut self, reason: &str) {
        self.status = ItemStatus::Failed;
        self.error = Some(if reason.trim().is_empty() {
            "unknown error".to_string()
        } else {
            reason.to_string()
        });
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            url: "https://host.example/video/1".into(),
            title: "A Video".into(),
            thumbnail: None,
            size: Some(1024),
        }
    }

    #[test]
    fn test_from_candidate_starts_pending_download() {
        let item = QueueItem::from_candidate(&candidate(), "alice", 3);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.phase, Phase::Download);
        assert_eq!(item.priority, 3);
        assert_eq!(item.size, Some(1024));
        assert!(item.file_path.is_none());
    }

    #[test]
    fn test_from_local_file_starts_in_upload_phase() {
        let item = QueueItem::from_local_file(PathBuf::from("/tmp/clip.mp4"), "alice", 0);
        assert_eq!(item.phase, Phase::Upload);
        assert_eq!(item.video.title, "clip");
        assert!(item.video.url.is_none());
        assert!(item.file_path.is_some());
    }

    #[test]
    fn test_failed_items_always_carry_a_reason() {
        let mut item = QueueItem::from_candidate(&candidate(), "alice", 0);
        item.mark_failed("   ");
        assert_eq!(item.status, ItemStatus::Failed);
        assert!(!item.error.as_deref().unwrap().trim().is_empty());

        item.mark_failed("timeout");
        assert_eq!(item.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ItemStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        let json = serde_json::to_string(&Phase::Upload).unwrap();
        assert_eq!(json, "\"upload\"");
    }
}
