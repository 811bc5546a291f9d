//! Full-stream download fallback.
//!
//! Used when the server rejects range requests, or as the target of the
//! download-intent URL fallback. Same progress semantics as the chunked
//! path.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{header, Client};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Stream a URL to disk unconditionally.
///
/// Returns the number of bytes written. The whole transfer is bounded by
/// `timeout_secs` so a stalled peer cannot hold the pipeline.
pub async fn download_stream(
    client: &Client,
    url: &str,
    cookies: &str,
    dest: &Path,
    timeout_secs: u64,
    progress: mpsc::UnboundedSender<u64>,
) -> Result<u64> {
    let transfer = stream_to_file(client, url, cookies, dest, progress);

    match tokio::time::timeout(Duration::from_secs(timeout_secs), transfer).await {
        Ok(result) => result,
        Err(_) => Err(Error::Download(format!(
            "Streaming download timed out after {}s",
            timeout_secs
        ))),
    }
}

async fn stream_to_file(
    client: &Client,
    url: &str,
    cookies: &str,
    dest: &Path,
    progress: mpsc::UnboundedSender<u64>,
) -> Result<u64> {
    let response = client
        .get(url)
        .header(header::COOKIE, cookies)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "Stream request failed: HTTP {}",
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Download(format!("Stream error: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        let _ = progress.send(chunk.len() as u64);
    }

    file.flush().await?;

    Ok(written)
}
