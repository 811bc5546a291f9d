//! Queue module.
//!
//! This module provides:
//! - The queue item model and its two-phase lifecycle
//! - Queue persistence
//! - Isolated execution units for engine runs
//! - The single-active-item orchestrator

pub mod item;
pub mod orchestrator;
pub mod store;
pub mod unit;

pub use item::{ItemStatus, Phase, QueueItem, VideoInfo};
pub use orchestrator::{Orchestrator, QueueCommand};
pub use store::{EphemeralQueueStore, JsonQueueStore, QueueStore};
pub use unit::{spawn_discovery_unit, spawn_download_unit, spawn_upload_unit, UnitHandle};
