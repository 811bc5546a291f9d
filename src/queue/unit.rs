//! Isolated execution units.
//!
//! Each engine run lives in its own tokio task and talks to the host only
//! through messages: engine events flow out over an mpsc channel, and
//! host-owned capabilities are reached back through the RPC bridge. A
//! cancelled unit gets a stop signal first and is force-aborted after a
//! short grace period.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::discover::{discover, Candidate, DiscoverRequest};
use crate::download::{run_download, DownloadOutcome, DownloadRequest};
use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::queue::item::Phase;
use crate::rpc::{RpcBridge, RpcHandler, RpcHost};
use crate::upload::{run_upload, UploadRequest};

/// How long a stopped unit may keep running before it is aborted.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// RPC capacity between one unit and the host.
const RPC_CHANNEL_CAPACITY: usize = 8;

/// Handle to one spawned unit, owned by the orchestrator.
pub struct UnitHandle {
    pub item_id: Uuid,
    pub phase: Phase,
    join: JoinHandle<()>,
    stop: watch::Sender<bool>,
    /// Host-side RPC dispatch task, torn down with the unit.
    host_task: Option<JoinHandle<()>>,
}

impl UnitHandle {
    /// Signal the unit to stop, aborting it after the grace period.
    pub async fn cancel(mut self) {
        let _ = self.stop.send(true);

        if tokio::time::timeout(STOP_GRACE, &mut self.join).await.is_err() {
            tracing::warn!(
                "Unit for item {} ignored stop signal; aborting",
                self.item_id
            );
            self.join.abort();
        }

        if let Some(host_task) = self.host_task {
            host_task.abort();
        }
    }

    /// Tear down bookkeeping after the unit finished on its own.
    pub fn finished(self) {
        if let Some(host_task) = self.host_task {
            host_task.abort();
        }
    }
}

/// Host capability: fetch a page with the host's HTTP context.
struct PageFetchHandler {
    client: Client,
    cookies: String,
    user_agent: String,
}

#[async_trait]
impl RpcHandler for PageFetchHandler {
    async fn handle(&self, args: Value) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Rpc("page.fetch requires a 'url' argument".into()))?;

        let html = self
            .client
            .get(url)
            .header(header::COOKIE, &self.cookies)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Rpc(format!("page.fetch failed: {}", e)))?
            .text()
            .await?;

        Ok(Value::String(html))
    }
}

/// Spawn the download phase for one item as an isolated unit.
pub fn spawn_download_unit(
    client: Client,
    config: std::sync::Arc<Config>,
    item_id: Uuid,
    request: DownloadRequest,
    events: mpsc::Sender<EngineEvent>,
) -> UnitHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    // RPC wiring: the unit reaches back to the host for page fetches.
    let (rpc_tx, rpc_rx) = mpsc::channel(RPC_CHANNEL_CAPACITY);
    let (bridge, responder) = RpcBridge::new(
        rpc_tx,
        Duration::from_secs(config.limits.rpc_timeout_secs),
    );

    let mut host = RpcHost::new();
    host.register(
        "page.fetch",
        std::sync::Arc::new(PageFetchHandler {
            client: client.clone(),
            cookies: request.cookies.clone(),
            user_agent: config.origin.user_agent.clone(),
        }),
    );
    let host_task = tokio::spawn(host.serve(rpc_rx, responder));

    let join = tokio::spawn(async move {
        let engine = run_download(&client, &bridge, &config, &request, &events);
        tokio::pin!(engine);

        let outcome = tokio::select! {
            outcome = &mut engine => outcome,
            _ = stop_rx.changed() => {
                tracing::debug!("Download unit for {} stopping on signal", request.video_id);
                return;
            }
        };

        let event = match outcome {
            Ok(DownloadOutcome::Completed { path, size }) => EngineEvent::Complete {
                video_id: request.video_id.clone(),
                path: Some(path),
                size: Some(size),
            },
            Ok(DownloadOutcome::Skipped(reason)) => {
                // Already-existing files still feed the upload phase;
                // size-bound skips end the item without error.
                if matches!(
                    reason,
                    crate::download::SkipReason::AlreadyExists
                ) {
                    EngineEvent::Complete {
                        video_id: request.video_id.clone(),
                        path: Some(request.output_path.clone()),
                        size: None,
                    }
                } else {
                    let _ = events
                        .send(EngineEvent::Status {
                            video_id: request.video_id.clone(),
                            status: format!("skipped: {}", reason),
                        })
                        .await;
                    EngineEvent::Complete {
                        video_id: request.video_id.clone(),
                        path: None,
                        size: None,
                    }
                }
            }
            Err(e) => EngineEvent::Error {
                video_id: request.video_id.clone(),
                error: e.to_string(),
            },
        };

        let _ = events.send(event).await;
    });

    UnitHandle {
        item_id,
        phase: Phase::Download,
        join,
        stop: stop_tx,
        host_task: Some(host_task),
    }
}

/// Spawn the upload phase for one item as an isolated unit.
pub fn spawn_upload_unit(
    client: Client,
    config: std::sync::Arc<Config>,
    item_id: Uuid,
    request: UploadRequest,
    events: mpsc::Sender<EngineEvent>,
) -> UnitHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let engine = run_upload(&client, &config, &request, &events);
        tokio::pin!(engine);

        let result = tokio::select! {
            result = &mut engine => result,
            _ = stop_rx.changed() => {
                tracing::debug!("Upload unit for {} stopping on signal", request.video_id);
                return;
            }
        };

        let event = match result {
            Ok(()) => EngineEvent::Complete {
                video_id: request.video_id.clone(),
                path: Some(request.file_path.clone()),
                size: None,
            },
            Err(e) => EngineEvent::Error {
                video_id: request.video_id.clone(),
                error: e.to_string(),
            },
        };

        let _ = events.send(event).await;
    });

    UnitHandle {
        item_id,
        phase: Phase::Upload,
        join,
        stop: stop_tx,
        host_task: None,
    }
}

/// Spawn a discovery run as an isolated unit.
pub fn spawn_discovery_unit(
    client: Client,
    cookies: String,
    config: std::sync::Arc<Config>,
    request: DiscoverRequest,
    events: mpsc::Sender<EngineEvent>,
) -> JoinHandle<Result<Vec<Candidate>>> {
    tokio::spawn(async move {
        let result = discover(&client, &cookies, &config, &request, &events).await;

        match &result {
            Ok(candidates) => {
                let _ = events
                    .send(EngineEvent::Complete {
                        video_id: request.account_id.clone(),
                        path: None,
                        size: Some(candidates.len() as u64),
                    })
                    .await;
            }
            Err(e) => {
                let _ = events
                    .send(EngineEvent::Error {
                        video_id: request.account_id.clone(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_aborts_a_stuck_unit() {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        // A unit that never honors the stop signal.
        let join = tokio::spawn(async move {
            let _ = &mut stop_rx;
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });

        let handle = UnitHandle {
            item_id: Uuid::new_v4(),
            phase: Phase::Download,
            join,
            stop: stop_tx,
            host_task: None,
        };

        // Must return despite the unit ignoring the signal.
        tokio::time::timeout(Duration::from_secs(3), handle.cancel())
            .await
            .expect("cancel must not hang");
    }

    #[tokio::test]
    async fn test_cooperative_unit_stops_within_grace() {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let _ = stop_rx.changed().await;
        });

        let handle = UnitHandle {
            item_id: Uuid::new_v4(),
            phase: Phase::Upload,
            join,
            stop: stop_tx,
            host_task: None,
        };

        tokio::time::timeout(Duration::from_secs(2), handle.cancel())
            .await
            .expect("cooperative unit should stop fast");
    }
}
