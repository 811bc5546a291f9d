//! Streaming multipart/form-data framing.
//!
//! The file is streamed rather than buffered whole, so the body is framed
//! by hand: form fields first, then a single boundary-delimited file part,
//! then the closing boundary. File reads are paced with a short sleep and
//! flow through a bounded channel, so a slow transport suspends reading
//! instead of piling up buffers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, Stream};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Bytes read from disk per iteration.
const READ_CHUNK_SIZE: usize = 256 * 1024;

/// Pause between disk reads, bounding I/O pressure.
const READ_PAUSE: Duration = Duration::from_millis(10);

/// In-flight framed chunks before reads suspend on backpressure.
const CHANNEL_CAPACITY: usize = 4;

/// A manually framed multipart upload body.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    boundary: String,
    fields: Vec<(String, String)>,
    file_field: String,
    file_name: String,
    content_type: String,
}

impl MultipartUpload {
    pub fn new(file_name: &str) -> Self {
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();
        Self {
            boundary: generate_boundary(),
            fields: Vec::new(),
            file_field: "file".to_string(),
            file_name: file_name.to_string(),
            content_type,
        }
    }

    /// Append a form field. Fields are framed ahead of the file part in
    /// insertion order.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Content-Type header value for the request.
    pub fn content_type_header(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact body length for a file of the given size.
    pub fn content_length(&self, file_size: u64) -> u64 {
        self.prologue().len() as u64 + file_size + self.epilogue().len() as u64
    }

    /// Everything framed before the file bytes.
    fn prologue(&self) -> Bytes {
        let mut output = Vec::new();

        for (name, value) in &self.fields {
            output.extend_from_slice(b"--");
            output.extend_from_slice(self.boundary.as_bytes());
            output.extend_from_slice(b"\r\n");
            output.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"", name).as_bytes(),
            );
            output.extend_from_slice(b"\r\n\r\n");
            output.extend_from_slice(value.as_bytes());
            output.extend_from_slice(b"\r\n");
        }

        output.extend_from_slice(b"--");
        output.extend_from_slice(self.boundary.as_bytes());
        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                self.file_field, self.file_name
            )
            .as_bytes(),
        );
        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(format!("Content-Type: {}", self.content_type).as_bytes());
        output.extend_from_slice(b"\r\n\r\n");

        Bytes::from(output)
    }

    /// The closing boundary after the file bytes.
    fn epilogue(&self) -> Bytes {
        Bytes::from(format!("\r\n--{}--\r\n", self.boundary))
    }

    /// Frame the body as a byte stream reading from `path`.
    ///
    /// `bytes_sent` is advanced as framed bytes enter the channel, for
    /// speed sampling by the caller.
    pub fn frame_stream(
        &self,
        path: PathBuf,
        bytes_sent: Arc<AtomicU64>,
    ) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
        let (mut tx, rx) = mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(
            CHANNEL_CAPACITY,
        );
        let prologue = self.prologue();
        let epilogue = self.epilogue();

        tokio::spawn(async move {
            if send_counted(&mut tx, prologue, &bytes_sent).await.is_err() {
                return;
            }

            let mut file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut buffer = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match file.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = Bytes::copy_from_slice(&buffer[..n]);
                        if send_counted(&mut tx, chunk, &bytes_sent).await.is_err() {
                            // Transport dropped the body; stop reading.
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
                tokio::time::sleep(READ_PAUSE).await;
            }

            let _ = send_counted(&mut tx, epilogue, &bytes_sent).await;
        });

        rx
    }

    /// Build a reqwest body streaming the file.
    pub fn into_body(self, path: PathBuf, bytes_sent: Arc<AtomicU64>) -> Result<reqwest::Body> {
        let stream = self.frame_stream(path, bytes_sent);
        Ok(reqwest::Body::wrap_stream(stream))
    }
}

/// Send one framed chunk, advancing the byte counter.
///
/// The await suspends while the channel is full, which is what pauses
/// disk reads under transport backpressure.
async fn send_counted(
    tx: &mut mpsc::Sender<std::result::Result<Bytes, std::io::Error>>,
    bytes: Bytes,
    counter: &AtomicU64,
) -> std::result::Result<(), mpsc::SendError> {
    counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
    tx.send(Ok(bytes)).await
}

/// Random boundary unlikely to collide with file content.
fn generate_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("----MediaRelayBoundary{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn upload() -> MultipartUpload {
        MultipartUpload::new("video.mp4")
            .field("response_token", "tok")
            .field("nonce", "n1")
    }

    #[test]
    fn test_prologue_layout() {
        let upload = upload();
        let prologue = String::from_utf8(upload.prologue().to_vec()).unwrap();

        // Fields precede the file part, in insertion order.
        let tok_at = prologue.find("name=\"response_token\"").unwrap();
        let nonce_at = prologue.find("name=\"nonce\"").unwrap();
        let file_at = prologue.find("filename=\"video.mp4\"").unwrap();
        assert!(tok_at < nonce_at && nonce_at < file_at);

        assert!(prologue.contains("Content-Type: video/mp4"));
        assert!(prologue.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_epilogue_closes_boundary() {
        let upload = upload();
        let epilogue = String::from_utf8(upload.epilogue().to_vec()).unwrap();
        assert!(epilogue.starts_with("\r\n--"));
        assert!(epilogue.ends_with("--\r\n"));
        assert!(epilogue.contains(&upload.boundary));
    }

    #[tokio::test]
    async fn test_framed_stream_matches_content_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        let payload = vec![0xAB_u8; 700_000];
        std::fs::write(&path, &payload).unwrap();

        let upload = upload();
        let expected = upload.content_length(payload.len() as u64);

        let sent = Arc::new(AtomicU64::new(0));
        let mut stream = upload.frame_stream(path, sent.clone());

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(body.len() as u64, expected);
        assert_eq!(sent.load(Ordering::Relaxed), expected);

        // The raw file bytes appear between prologue and epilogue.
        let body_str = String::from_utf8_lossy(&body);
        assert!(body_str.starts_with("--"));
        assert!(body_str.trim_end().ends_with("--"));
    }

    #[test]
    fn test_boundaries_are_unique() {
        assert_ne!(
            MultipartUpload::new("a.mp4").boundary,
            MultipartUpload::new("a.mp4").boundary
        );
    }
}
