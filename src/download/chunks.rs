//! Chunked range download.
//!
//! The transfer is partitioned into fixed-size chunks downloaded under a
//! counting semaphore and written straight to their byte offset in the
//! destination file, so memory stays bounded to the in-flight chunk
//! buffers regardless of file size.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::config::LimitsConfig;
use crate::error::{Error, Result};

/// One byte-range slice of a transfer. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive HTTP range header value for this chunk.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

/// Partition `[0, total_size)` into chunks of at most `chunk_size` bytes.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<Chunk> {
    assert!(chunk_size > 0, "chunk size must be non-zero");

    let mut chunks = Vec::with_capacity(total_size.div_ceil(chunk_size) as usize);
    let mut start = 0;
    let mut index = 0;

    while start < total_size {
        let end = (start + chunk_size).min(total_size);
        chunks.push(Chunk { index, start, end });
        start = end;
        index += 1;
    }

    chunks
}

/// Download a file of known size in concurrent chunks.
///
/// Byte counts are reported on `progress` as chunks land. A 416 from any
/// chunk aborts the whole transfer with [`Error::RangeNotSatisfiable`] so
/// the caller can fall back to streaming.
pub async fn download_chunked(
    client: &Client,
    url: &str,
    cookies: &str,
    total_size: u64,
    dest: &Path,
    limits: &LimitsConfig,
    progress: mpsc::UnboundedSender<u64>,
) -> Result<()> {
    let chunks = plan_chunks(total_size, limits.chunk_size);
    tracing::debug!(
        "Chunked download: {} chunks of {} bytes",
        chunks.len(),
        limits.chunk_size
    );

    // Pre-size the file so chunks can land at their offsets in any order.
    {
        let file = tokio::fs::File::create(dest).await?;
        file.set_len(total_size).await?;
    }

    let semaphore = Arc::new(Semaphore::new(limits.chunk_concurrency));
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    for chunk in chunks {
        let client = client.clone();
        let url = url.to_string();
        let cookies = cookies.to_string();
        let dest: PathBuf = dest.to_path_buf();
        let semaphore = semaphore.clone();
        let progress = progress.clone();
        let retries = limits.chunk_retries;
        let timeout = Duration::from_secs(limits.chunk_timeout_secs);

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| Error::Download("Chunk limiter closed".into()))?;

            let bytes = fetch_chunk_with_retry(&client, &url, &cookies, chunk, retries, timeout)
                .await?;

            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&dest)
                .await?;
            file.seek(SeekFrom::Start(chunk.start)).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;

            let _ = progress.send(chunk.len());
            Ok(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| Error::Download(format!("Chunk task panicked: {}", e)))?;
        if let Err(e) = result {
            tasks.abort_all();
            return Err(e);
        }
    }

    Ok(())
}

/// Fetch one chunk, retrying transport failures a bounded number of times.
///
/// A 416 is not retried: the server is telling us range mode is wrong.
async fn fetch_chunk_with_retry(
    client: &Client,
    url: &str,
    cookies: &str,
    chunk: Chunk,
    retries: u32,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let mut last_error = None;

    for attempt in 1..=retries.max(1) {
        match tokio::time::timeout(timeout, fetch_chunk(client, url, cookies, chunk)).await {
            Ok(Ok(bytes)) => return Ok(bytes),
            Ok(Err(Error::RangeNotSatisfiable)) => return Err(Error::RangeNotSatisfiable),
            Ok(Err(e)) => {
                tracing::debug!(
                    "Chunk {} attempt {}/{} failed: {}",
                    chunk.index,
                    attempt,
                    retries,
                    e
                );
                last_error = Some(e);
            }
            Err(_) => {
                tracing::debug!(
                    "Chunk {} attempt {}/{} timed out",
                    chunk.index,
                    attempt,
                    retries
                );
                last_error = Some(Error::Download(format!(
                    "Chunk {} timed out after {:?}",
                    chunk.index, timeout
                )));
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::Download(format!("Chunk {} failed with no attempts", chunk.index))))
}

async fn fetch_chunk(client: &Client, url: &str, cookies: &str, chunk: Chunk) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .header(header::RANGE, chunk.range_header())
        .header(header::COOKIE, cookies)
        .send()
        .await?;

    if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        return Err(Error::RangeNotSatisfiable);
    }

    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "Chunk {} failed: HTTP {}",
            chunk.index,
            response.status()
        )));
    }

    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_covers_range_exactly() {
        let chunks = plan_chunks(10 * 1024 * 1024, 1024 * 1024);
        assert_eq!(chunks.len(), 10);

        assert_eq!(chunks[0].start, 0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(chunks.last().unwrap().end, 10 * 1024 * 1024);
    }

    #[test]
    fn test_plan_uneven_tail() {
        let chunks = plan_chunks(2_500_000, 1_000_000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].start, 2_000_000);
        assert_eq!(chunks[2].end, 2_500_000);
        assert_eq!(chunks[2].len(), 500_000);
    }

    #[test]
    fn test_plan_chunk_count_is_ceil() {
        assert_eq!(plan_chunks(1, 1024).len(), 1);
        assert_eq!(plan_chunks(1024, 1024).len(), 1);
        assert_eq!(plan_chunks(1025, 1024).len(), 2);
        assert_eq!(plan_chunks(0, 1024).len(), 0);
    }

    #[test]
    fn test_plan_total_length_matches() {
        let total: u64 = plan_chunks(7_777_777, 65536).iter().map(Chunk::len).sum();
        assert_eq!(total, 7_777_777);
    }

    #[test]
    fn test_range_header_is_inclusive() {
        let chunk = Chunk {
            index: 0,
            start: 0,
            end: 1024,
        };
        assert_eq!(chunk.range_header(), "bytes=0-1023");

        let chunk = Chunk {
            index: 3,
            start: 3072,
            end: 4000,
        };
        assert_eq!(chunk.range_header(), "bytes=3072-3999");
    }
}
