//! Queue orchestration.
//!
//! A two-phase (download then upload) state machine per item. Exactly one
//! item is active at a time; the active unit handle is owned here with a
//! single set/clear point, never exposed as ambient state. Failures are
//! recorded on the item and the queue moves on.

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::download::DownloadRequest;
use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::fs::paths::filename_for_title;
use crate::queue::item::{ItemStatus, Phase, QueueItem};
use crate::queue::store::QueueStore;
use crate::queue::unit::{spawn_download_unit, spawn_upload_unit, UnitHandle};
use crate::session::SessionManager;
use crate::upload::UploadRequest;

/// Commands accepted by a running orchestrator.
#[derive(Debug)]
pub enum QueueCommand {
    Enqueue(Box<QueueItem>),
    Pause,
    Resume,
    Remove(Uuid),
    Clear,
    /// Stable priority reassignment in the given order.
    Reorder(Vec<Uuid>),
    RetryFailed,
    /// Stop the active unit, keeping the item's position.
    Cancel(Uuid),
    Shutdown,
}

/// Capacity of the unit-to-host event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct Orchestrator {
    config: Arc<Config>,
    client: Client,
    sessions: Arc<SessionManager>,
    store: Box<dyn QueueStore>,
    items: Vec<QueueItem>,
    /// The single active unit. Set when a phase starts, cleared when its
    /// terminal event arrives or it is cancelled.
    active: Option<UnitHandle>,
    paused: bool,
    /// Exit `run` once nothing is pending or active (CLI drain mode).
    exit_when_idle: bool,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: mpsc::Receiver<EngineEvent>,
    /// Optional mirror of all engine events for the presentation layer.
    subscriber: Option<mpsc::Sender<EngineEvent>>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        client: Client,
        sessions: Arc<SessionManager>,
        store: Box<dyn QueueStore>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            client,
            sessions,
            store,
            items: Vec::new(),
            active: None,
            paused: false,
            exit_when_idle: false,
            events_tx,
            events_rx,
            subscriber: None,
        }
    }

    /// Mirror engine events to an external listener.
    pub fn subscribe(&mut self, subscriber: mpsc::Sender<EngineEvent>) {
        self.subscriber = Some(subscriber);
    }

    /// Make `run` return once the queue drains.
    pub fn exit_when_idle(&mut self) {
        self.exit_when_idle = true;
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Directly enqueue an item (before or instead of running).
    pub fn enqueue(&mut self, mut item: QueueItem) {
        item.priority = self.items.len() as u32;
        self.items.push(item);
    }

    /// Drive the queue until shutdown (or drain, in drain mode).
    pub async fn run(mut self, mut commands: mpsc::Receiver<QueueCommand>) -> Result<Vec<QueueItem>> {
        let mut persisted = self.store.load()?;
        // Pre-enqueued items follow whatever was persisted.
        for item in self.items.drain(..).collect::<Vec<_>>() {
            persisted.push(item);
        }
        self.items = persisted;
        self.renumber();

        loop {
            self.advance().await;
            self.store.save(&self.items)?;

            if self.exit_when_idle && self.active.is_none() && !self.has_pending() {
                break;
            }

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(QueueCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }
            }
        }

        if let Some(active) = self.active.take() {
            active.cancel().await;
            if let Some(item) = self.items.iter_mut().find(|i| i.status == ItemStatus::Active)
            {
                item.status = ItemStatus::Pending;
                item.touch();
            }
        }

        self.store.save(&self.items)?;
        Ok(self.items)
    }

    /// Start the next pending item when nothing is active.
    async fn advance(&mut self) {
        while self.active.is_none() && !self.paused {
            let Some(index) = self.next_pending_index() else {
                return;
            };

            let item_id = self.items[index].id;
            match self.start_phase(index).await {
                Ok(handle) => {
                    let item = &mut self.items[index];
                    item.status = ItemStatus::Active;
                    item.touch();
                    self.active = Some(handle);
                }
                Err(e) => {
                    tracing::warn!("Failed to start item {}: {}", item_id, e);
                    self.items[index].mark_failed(&e.to_string());
                    // Isolated failure: keep advancing to the next item.
                }
            }
        }
    }

    /// Spawn the unit for an item's current phase.
    async fn start_phase(&mut self, index: usize) -> Result<UnitHandle> {
        let item = &mut self.items[index];
        // Cookies are re-read at phase start, never cached from enqueue time.
        let cookies = self.sessions.get_cookies(&item.account_id).await?;

        match item.phase {
            Phase::Download => {
                let url = item.video.url.clone().ok_or_else(|| {
                    Error::Queue("Download phase requires a source URL".to_string())
                })?;
                let filename = filename_for_title(&item.video.title, "mp4")?;
                let output_path = self.config.download_directory().join(filename);

                let request = DownloadRequest {
                    video_id: item.id.to_string(),
                    url,
                    output_path,
                    cookies,
                };

                Ok(spawn_download_unit(
                    self.client.clone(),
                    self.config.clone(),
                    item.id,
                    request,
                    self.events_tx.clone(),
                ))
            }
            Phase::Upload => {
                let file_path = item.file_path.clone().ok_or_else(|| {
                    Error::Queue("Upload phase requires a local file".to_string())
                })?;

                let request = UploadRequest {
                    video_id: item.id.to_string(),
                    file_path,
                    cookies,
                };

                Ok(spawn_upload_unit(
                    self.client.clone(),
                    self.config.clone(),
                    item.id,
                    request,
                    self.events_tx.clone(),
                ))
            }
        }
    }

    /// Fold a unit event into queue state.
    async fn handle_event(&mut self, event: EngineEvent) {
        if let Some(ref subscriber) = self.subscriber {
            let _ = subscriber.send(event.clone()).await;
        }

        let Some(index) = self
            .items
            .iter()
            .position(|i| i.id.to_string() == event.video_id())
        else {
            tracing::debug!("Event for unknown item: {}", event.video_id());
            return;
        };

        match event {
            EngineEvent::Status { status, .. } => {
                let item = &mut self.items[index];
                item.sub_phase = Some(status);
                item.touch();
            }
            EngineEvent::Progress {
                progress,
                speed,
                eta,
                size,
                ..
            } => {
                let item = &mut self.items[index];
                item.progress = progress;
                item.speed = speed;
                item.eta = eta;
                if size.is_some() {
                    item.size = size;
                }
                item.touch();
            }
            EngineEvent::Complete { path, size, .. } => {
                self.finish_active();
                let item = &mut self.items[index];
                if size.is_some() {
                    item.size = size;
                }

                match (item.phase, path) {
                    (Phase::Download, Some(path)) => {
                        // Same item flows into the upload phase with the
                        // freshly produced file.
                        item.file_path = Some(path);
                        item.phase = Phase::Upload;
                        item.status = ItemStatus::Pending;
                        item.progress = 0.0;
                        item.speed = None;
                        item.eta = None;
                        item.sub_phase = None;
                        item.touch();
                    }
                    (Phase::Download, None) => {
                        // Size-bound skip: nothing to upload.
                        item.status = ItemStatus::Completed;
                        item.touch();
                    }
                    (Phase::Upload, _) => {
                        item.status = ItemStatus::Completed;
                        item.progress = 100.0;
                        item.speed = None;
                        item.eta = None;
                        item.touch();
                    }
                }
            }
            EngineEvent::Error { error, .. } => {
                self.finish_active();
                self.items[index].mark_failed(&error);
                tracing::warn!("Item {} failed: {}", self.items[index].id, error);
            }
        }
    }

    async fn handle_command(&mut self, command: QueueCommand) {
        match command {
            QueueCommand::Enqueue(item) => self.enqueue(*item),
            QueueCommand::Pause => {
                self.paused = true;
            }
            QueueCommand::Resume => {
                self.paused = false;
                for item in &mut self.items {
                    if item.status == ItemStatus::Paused {
                        item.status = ItemStatus::Pending;
                        item.touch();
                    }
                }
            }
            QueueCommand::Remove(id) => self.remove(id),
            QueueCommand::Clear => self.clear(),
            QueueCommand::Reorder(order) => self.reorder(&order),
            QueueCommand::RetryFailed => self.retry_failed(),
            QueueCommand::Cancel(id) => self.cancel(id).await,
            QueueCommand::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    /// Remove a non-active item.
    pub fn remove(&mut self, id: Uuid) {
        self.items
            .retain(|item| item.id != id || item.status == ItemStatus::Active);
        self.renumber();
    }

    /// Remove everything that is not currently active.
    pub fn clear(&mut self) {
        self.items.retain(|item| item.status == ItemStatus::Active);
        self.renumber();
    }

    /// Stable priority reassignment: listed ids first, in order, then the
    /// rest in their existing order.
    pub fn reorder(&mut self, order: &[Uuid]) {
        let position = |id: &Uuid| order.iter().position(|o| o == id);
        self.items.sort_by_key(|item| {
            (
                position(&item.id).unwrap_or(usize::MAX),
                item.priority,
            )
        });
        self.renumber();
    }

    /// Send all failed items back to pending.
    pub fn retry_failed(&mut self) {
        for item in &mut self.items {
            if item.status == ItemStatus::Failed {
                item.status = ItemStatus::Pending;
                item.error = None;
                item.progress = 0.0;
                item.touch();
            }
        }
    }

    /// Cancel the active item, keeping its queue position.
    async fn cancel(&mut self, id: Uuid) {
        let is_active = self
            .active
            .as_ref()
            .map(|handle| handle.item_id == id)
            .unwrap_or(false);
        if !is_active {
            return;
        }

        if let Some(handle) = self.active.take() {
            handle.cancel().await;
        }
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.status = ItemStatus::Paused;
            item.sub_phase = Some("cancelled".to_string());
            item.touch();
        }
    }

    /// Clear the active handle after its unit emitted a terminal event.
    fn finish_active(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.finished();
        }
    }

    fn next_pending_index(&self) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status == ItemStatus::Pending)
            .min_by_key(|(_, item)| item.priority)
            .map(|(index, _)| index)
    }

    fn has_pending(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.status == ItemStatus::Pending)
    }

    fn renumber(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.priority = index as u32;
        }
    }

    /// Number of active items; must never exceed one.
    pub fn active_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountStore;
    use crate::discover::Candidate;
    use crate::queue::store::EphemeralQueueStore;

    fn candidate(n: u32) -> Candidate {
        Candidate {
            url: format!("http://127.0.0.1:1/video/{}", n),
            title: format!("Video {}", n),
            thumbnail: None,
            size: None,
        }
    }

    async fn orchestrator_with_items(count: u32) -> Orchestrator {
        // Persist the dir for the test's lifetime; accounts and outputs
        // live side by side in it.
        let dir = tempfile::tempdir().unwrap().into_path();
        std::fs::write(dir.join("alice.cookies"), "PHPSESSID=abc\n").unwrap();
        let accounts = Arc::new(AccountStore::scan(&dir).await.unwrap());

        let mut config: Config = toml::from_str(
            r#"
            [origin]
            base_url = "http://127.0.0.1:1"
            "#,
        )
        .unwrap();
        config.storage.download_directory = Some(dir.join("downloads"));
        let config = Arc::new(config);

        let client = Client::new();
        let sessions = Arc::new(SessionManager::new(
            client.clone(),
            config.origin.clone(),
            accounts,
        ));

        let mut orchestrator = Orchestrator::new(
            config,
            client,
            sessions,
            Box::new(EphemeralQueueStore),
        );
        for n in 0..count {
            orchestrator.enqueue(QueueItem::from_candidate(&candidate(n), "alice", 0));
        }
        orchestrator
    }

    #[tokio::test]
    async fn test_reorder_is_stable() {
        let mut orchestrator = orchestrator_with_items(3).await;
        let ids: Vec<Uuid> = orchestrator.items().iter().map(|i| i.id).collect();

        orchestrator.reorder(&[ids[2], ids[0]]);

        let titles: Vec<&str> = orchestrator
            .items()
            .iter()
            .map(|i| i.video.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Video 2", "Video 0", "Video 1"]);
        let priorities: Vec<u32> = orchestrator.items().iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_remove_spares_active_items() {
        let mut orchestrator = orchestrator_with_items(2).await;
        let ids: Vec<Uuid> = orchestrator.items().iter().map(|i| i.id).collect();
        orchestrator.items[0].status = ItemStatus::Active;

        orchestrator.remove(ids[0]);
        orchestrator.remove(ids[1]);

        assert_eq!(orchestrator.items().len(), 1);
        assert_eq!(orchestrator.items()[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_clear_spares_active_items() {
        let mut orchestrator = orchestrator_with_items(3).await;
        orchestrator.items[1].status = ItemStatus::Active;

        orchestrator.clear();

        assert_eq!(orchestrator.items().len(), 1);
        assert_eq!(orchestrator.active_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_failed_resets_to_pending() {
        let mut orchestrator = orchestrator_with_items(2).await;
        orchestrator.items[0].mark_failed("boom");
        orchestrator.items[1].status = ItemStatus::Completed;

        orchestrator.retry_failed();

        assert_eq!(orchestrator.items()[0].status, ItemStatus::Pending);
        assert!(orchestrator.items()[0].error.is_none());
        assert_eq!(orchestrator.items()[1].status, ItemStatus::Completed);
    }

    #[tokio::test]
    async fn test_drain_run_isolates_failures() {
        // The origin is unroutable: every item must fail with a recorded
        // reason, the queue must not stall, and at most one item may be
        // active at any moment.
        let mut orchestrator = orchestrator_with_items(2).await;
        orchestrator.exit_when_idle();

        let (_commands_tx, commands_rx) = mpsc::channel(8);
        let items = tokio::time::timeout(
            std::time::Duration::from_secs(60),
            orchestrator.run(commands_rx),
        )
        .await
        .expect("drain run must terminate")
        .unwrap();

        assert_eq!(items.len(), 2);
        for item in &items {
            assert_eq!(item.status, ItemStatus::Failed);
            assert!(!item.error.as_deref().unwrap_or("").is_empty());
        }
    }
}
