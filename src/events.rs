//! Engine event schema.
//!
//! Every isolated execution unit reports back to the host through this
//! closed set of event kinds. The enum is serde-tagged so the payloads
//! that cross the unit/host boundary are validated by construction.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Event emitted by an engine unit, forwarded to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineEvent {
    /// Coarse lifecycle change (e.g. "resolving", "downloading", "uploading").
    Status { video_id: String, status: String },

    /// Incremental transfer or scan progress.
    Progress {
        video_id: String,
        /// Completion fraction in percent, 0.0..=100.0.
        progress: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },

    /// Terminal success for one phase.
    Complete {
        video_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },

    /// Terminal failure for one phase.
    Error { video_id: String, error: String },
}

impl EngineEvent {
    /// The id of the queue item this event belongs to.
    pub fn video_id(&self) -> &str {
        match self {
            EngineEvent::Status { video_id, .. }
            | EngineEvent::Progress { video_id, .. }
            | EngineEvent::Complete { video_id, .. }
            | EngineEvent::Error { video_id, .. } => video_id,
        }
    }

    /// Whether this event terminates the phase that emitted it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::Complete { .. } | EngineEvent::Error { .. })
    }
}
