//! Queue persistence.
//!
//! The queue survives restarts through a narrow store contract; the
//! shipped implementation is a JSON file.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::queue::item::{ItemStatus, QueueItem};

/// Read/write access to the persisted queue.
pub trait QueueStore: Send + Sync {
    fn load(&self) -> Result<Vec<QueueItem>>;
    fn save(&self, items: &[QueueItem]) -> Result<()>;
}

/// JSON-file backed queue store.
pub struct JsonQueueStore {
    path: PathBuf,
}

impl JsonQueueStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl QueueStore for JsonQueueStore {
    /// Load the persisted queue.
    ///
    /// Items that were active when the process died are demoted to
    /// pending so an interrupted run resumes cleanly.
    fn load(&self) -> Result<Vec<QueueItem>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut items: Vec<QueueItem> = serde_json::from_str(&content)
            .map_err(|e| Error::Queue(format!("Corrupt queue file: {}", e)))?;

        for item in &mut items {
            if item.status == ItemStatus::Active {
                item.status = ItemStatus::Pending;
                item.sub_phase = None;
                item.touch();
            }
        }

        Ok(items)
    }

    fn save(&self, items: &[QueueItem]) -> Result<()> {
        let content = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// In-memory store for runs that should not persist anything.
#[derive(Default)]
pub struct EphemeralQueueStore;

impl QueueStore for EphemeralQueueStore {
    fn load(&self) -> Result<Vec<QueueItem>> {
        Ok(Vec::new())
    }

    fn save(&self, _items: &[QueueItem]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::Candidate;

    fn item(title: &str) -> QueueItem {
        QueueItem::from_candidate(
            &Candidate {
                url: format!("https://host.example/{}", title),
                title: title.to_string(),
                thumbnail: None,
                size: None,
            },
            "alice",
            0,
        )
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonQueueStore::new(dir.path().join("queue.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_demotes_active_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonQueueStore::new(dir.path().join("queue.json"));

        let mut items = vec![item("a"), item("b")];
        items[0].status = ItemStatus::Active;
        items[1].status = ItemStatus::Completed;
        store.save(&items).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].status, ItemStatus::Pending);
        assert_eq!(loaded[1].status, ItemStatus::Completed);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonQueueStore::new(path);
        assert!(store.load().is_err());
    }
}
