//! Upload phase driver.
//!
//! Obtains signed parameters once, then streams the file to the CDN with
//! bounded retries. Speed is smoothed with an exponential moving average
//! over instantaneous rate samples.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::upload::multipart::MultipartUpload;
use crate::upload::params::{fetch_upload_params, UploadParams};

/// Interval between speed samples.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// EMA blend factor for new rate samples.
const SMOOTHING_ALPHA: f64 = 0.3;

/// Input for one upload run.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub video_id: String,
    pub file_path: PathBuf,
    pub cookies: String,
}

/// Exponential moving average over rate samples.
#[derive(Debug)]
pub(crate) struct SmoothedRate {
    alpha: f64,
    value: Option<f64>,
}

impl SmoothedRate {
    pub(crate) fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// Blend in a new instantaneous sample and return the smoothed rate.
    pub(crate) fn sample(&mut self, rate: f64) -> f64 {
        let next = match self.value {
            Some(previous) => self.alpha * rate + (1.0 - self.alpha) * previous,
            None => rate,
        };
        self.value = Some(next);
        next
    }
}

/// Run the upload phase for one item.
pub async fn run_upload(
    client: &Client,
    config: &Config,
    request: &UploadRequest,
    events: &mpsc::Sender<EngineEvent>,
) -> Result<()> {
    let metadata = tokio::fs::metadata(&request.file_path).await?;
    let file_size = metadata.len();
    let file_name = request
        .file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Upload("File path has no usable name".into()))?
        .to_string();

    let _ = events
        .send(EngineEvent::Status {
            video_id: request.video_id.clone(),
            status: "preparing upload".to_string(),
        })
        .await;

    // Fetched once; only the transfer is repeated on retry.
    let params = fetch_upload_params(
        client,
        &config.origin,
        &request.cookies,
        &file_name,
        file_size,
    )
    .await?;

    let attempts = config.limits.upload_attempts.max(1);
    let retry_delay = Duration::from_secs(config.limits.upload_retry_delay_secs);
    let mut last_error = None;

    for attempt in 1..=attempts {
        tracing::debug!("Upload attempt {}/{} for {}", attempt, attempts, file_name);

        match attempt_transfer(client, &params, request, &file_name, file_size, events).await {
            Ok(()) => {
                tracing::info!("Uploaded: {}", file_name);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Upload attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    Err(Error::Upload(format!(
        "All {} attempts failed; last error: {}",
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// One streaming transfer to the CDN.
async fn attempt_transfer(
    client: &Client,
    params: &UploadParams,
    request: &UploadRequest,
    file_name: &str,
    file_size: u64,
    events: &mpsc::Sender<EngineEvent>,
) -> Result<()> {
    let mut multipart = MultipartUpload::new(file_name);
    for (name, value) in params.form_fields() {
        multipart = multipart.field(&name, &value);
    }

    let content_type = multipart.content_type_header();
    let content_length = multipart.content_length(file_size);

    let bytes_sent = Arc::new(AtomicU64::new(0));
    let sampler = spawn_speed_sampler(
        request.video_id.clone(),
        content_length,
        bytes_sent.clone(),
        events.clone(),
    );

    let body = multipart.into_body(request.file_path.clone(), bytes_sent)?;

    let result = client
        .post(&params.upload_url)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, content_length)
        .body(body)
        .send()
        .await;

    sampler.abort();

    let response = result?;
    if !response.status().is_success() {
        return Err(Error::UploadRejected(format!(
            "CDN returned HTTP {}",
            response.status()
        )));
    }

    let _ = events
        .send(EngineEvent::Progress {
            video_id: request.video_id.clone(),
            progress: 100.0,
            speed: None,
            eta: Some(0),
            size: Some(file_size),
        })
        .await;

    Ok(())
}

/// Emit smoothed progress events at a fixed sampling interval.
fn spawn_speed_sampler(
    video_id: String,
    total: u64,
    bytes_sent: Arc<AtomicU64>,
    events: mpsc::Sender<EngineEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut smoothed = SmoothedRate::new(SMOOTHING_ALPHA);
        let mut previous = 0u64;

        loop {
            tokio::time::sleep(SAMPLE_INTERVAL).await;

            let sent = bytes_sent.load(Ordering::Relaxed);
            let delta = sent.saturating_sub(previous);
            previous = sent;

            let instantaneous = delta as f64 / SAMPLE_INTERVAL.as_secs_f64();
            let speed = smoothed.sample(instantaneous);

            let progress = if total > 0 {
                (sent as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let eta = if speed > 0.0 {
                Some(((total.saturating_sub(sent)) as f64 / speed).ceil() as u64)
            } else {
                None
            };

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
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut rate = SmoothedRate::new(0.3);
        assert_eq!(rate.sample(1000.0), 1000.0);
    }

    #[test]
    fn test_smoothing_blends_toward_new_samples() {
        let mut rate = SmoothedRate::new(0.3);
        rate.sample(1000.0);
        let second = rate.sample(2000.0);

        // Smoothed value moves toward the new sample without jumping.
        assert!(second > 1000.0);
        assert!(second < 2000.0);
        assert!((second - 1300.0).abs() < 1e-9);
    }

    #[test]
    fn test_steady_samples_converge() {
        let mut rate = SmoothedRate::new(0.3);
        let mut value = rate.sample(500.0);
        for _ in 0..50 {
            value = rate.sample(500.0);
        }
        assert!((value - 500.0).abs() < 1e-6);
    }
}
