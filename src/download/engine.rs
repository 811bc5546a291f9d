//! Download phase driver.
//!
//! Resolves the playable URL and size from the detail page, validates
//! size bounds, then transfers: chunked with bounded concurrency while
//! the server honors ranges, full-stream otherwise. The detail page is
//! fetched through the RPC bridge because that request must originate
//! from the host's HTTP context.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::download::chunks::download_chunked;
use crate::download::metadata::{probe_size, resolve_media_url, with_download_intent};
use crate::download::rate::RateWindow;
use crate::download::stream::download_stream;
use crate::download::watermark::apply_watermark;
use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::fs::paths::part_path;
use crate::rpc::RpcBridge;

/// Sliding window used for speed/ETA estimation.
const SPEED_WINDOW: Duration = Duration::from_secs(10);

/// Minimum interval between emitted progress events.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Input for one download run.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub video_id: String,
    /// Detail page URL on the origin site.
    pub url: String,
    pub output_path: PathBuf,
    pub cookies: String,
}

/// Why a download was skipped without transferring anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyExists,
    TooSmall { size: u64 },
    TooLarge { size: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => write!(f, "destination file already exists"),
            SkipReason::TooSmall { size } => write!(f, "too small ({} bytes)", size),
            SkipReason::TooLarge { size } => write!(f, "too large ({} bytes)", size),
        }
    }
}

/// Terminal result of a download run.
#[derive(Debug)]
pub enum DownloadOutcome {
    Completed { path: PathBuf, size: u64 },
    Skipped(SkipReason),
}

/// Run the download phase for one item.
pub async fn run_download(
    client: &Client,
    bridge: &RpcBridge,
    config: &Config,
    request: &DownloadRequest,
    events: &mpsc::Sender<EngineEvent>,
) -> Result<DownloadOutcome> {
    // An existing destination short-circuits the whole operation.
    if request.output_path.exists() {
        tracing::info!(
            "Skipping existing file: {}",
            request.output_path.display()
        );
        return Ok(DownloadOutcome::Skipped(SkipReason::AlreadyExists));
    }

    send_status(events, &request.video_id, "resolving").await;

    // Phase 1: metadata resolution, routed through the host.
    let detail_url = with_download_intent(&request.url);
    let html = bridge.fetch_page(&detail_url).await?;

    let media_url = resolve_media_url(&html).ok_or(Error::Extraction)?;

    let size = probe_size(client, &media_url, &request.cookies)
        .await?
        .ok_or_else(|| Error::SizeUnknown(request.url.clone()))?;

    tracing::debug!("Resolved media: {} ({} bytes)", media_url, size);

    // Inclusive bounds; rejects are skips, not failures.
    let limits = &config.limits;
    if size < limits.min_file_size {
        return Ok(DownloadOutcome::Skipped(SkipReason::TooSmall { size }));
    }
    if size > limits.max_file_size {
        return Ok(DownloadOutcome::Skipped(SkipReason::TooLarge { size }));
    }

    // Phase 2: transfer into a temp file.
    send_status(events, &request.video_id, "downloading").await;

    if let Some(parent) = request.output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let part = part_path(&request.output_path);

    let (progress_tx, forwarder) =
        spawn_progress_forwarder(request.video_id.clone(), size, events.clone());

    let transfer = transfer(
        client,
        config,
        request,
        &media_url,
        &detail_url,
        size,
        &part,
        progress_tx,
    )
    .await;

    let _ = forwarder.await;

    if let Err(e) = transfer {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e);
    }

    // Phase 3: finalize. A failed watermark never promotes the temp file.
    if config.watermark.enabled {
        send_status(events, &request.video_id, "watermarking").await;
        if let Err(e) = apply_watermark(&part, &config.watermark.text).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    }

    tokio::fs::rename(&part, &request.output_path).await?;

    tracing::info!("Downloaded: {}", request.output_path.display());

    Ok(DownloadOutcome::Completed {
        path: request.output_path.clone(),
        size,
    })
}

/// Chunked transfer with automatic full-stream fallback.
#[allow(clippy::too_many_arguments)]
async fn transfer(
    client: &Client,
    config: &Config,
    request: &DownloadRequest,
    media_url: &str,
    intent_url: &str,
    size: u64,
    part: &std::path::Path,
    progress: mpsc::UnboundedSender<u64>,
) -> Result<()> {
    let limits = &config.limits;

    match download_chunked(
        client,
        media_url,
        &request.cookies,
        size,
        part,
        limits,
        progress.clone(),
    )
    .await
    {
        Ok(()) => return Ok(()),
        Err(Error::RangeNotSatisfiable) => {
            tracing::warn!("Range requests rejected, restarting as full stream");
        }
        Err(e) => return Err(e),
    }

    // Restart from scratch: the chunked attempt's partial offsets are
    // meaningless to a stream.
    let streamed = match download_stream(
        client,
        media_url,
        &request.cookies,
        part,
        limits.stream_timeout_secs,
        progress.clone(),
    )
    .await
    {
        Ok(written) => written,
        Err(Error::Download(reason)) => {
            // The CDN rejected us; the origin's download-intent URL is the
            // last resort.
            tracing::warn!("CDN stream failed ({}), trying download-intent URL", reason);
            download_stream(
                client,
                intent_url,
                &request.cookies,
                part,
                limits.stream_timeout_secs,
                progress,
            )
            .await?
        }
        Err(e) => return Err(e),
    };

    if streamed != size {
        tracing::warn!(
            "Streamed size {} differs from resolved size {}",
            streamed,
            size
        );
    }

    Ok(())
}

/// Aggregate raw byte counts into throttled progress events.
fn spawn_progress_forwarder(
    video_id: String,
    total: u64,
    events: mpsc::Sender<EngineEvent>,
) -> (mpsc::UnboundedSender<u64>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<u64>();

    let handle = tokio::spawn(async move {
        let mut window = RateWindow::new(SPEED_WINDOW);
        let mut written: u64 = 0;
        let mut last_emit = Instant::now() - PROGRESS_INTERVAL;

        while let Some(bytes) = rx.recv().await {
            window.record(bytes);
            written += bytes;

            let done = written >= total;
            if !done && last_emit.elapsed() < PROGRESS_INTERVAL {
                continue;
            }
            last_emit = Instant::now();

            let progress = if total > 0 {
                (written as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let speed = window.speed();
            let eta = window.eta(total.saturating_sub(written));

            let _ = events
                .send(EngineEvent::Progress {
                    video_id: video_id.clone(),
                    progress: progress.min(100.0),
                    speed: Some(speed),
                    eta,
                    size: Some(total),
                })
                .await;
        }
    });

    (tx, handle)
}

async fn send_status(events: &mpsc::Sender<EngineEvent>, video_id: &str, status: &str) {
    let _ = events
        .send(EngineEvent::Status {
            video_id: video_id.to_string(),
            status: status.to_string(),
        })
        .await;
}
