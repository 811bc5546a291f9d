//! Watermark post-processing via ffmpeg.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Overlay text onto a video in place.
///
/// Renders into a sibling temp file; the original is only replaced after
/// ffmpeg exits successfully, so a failed run leaves it untouched.
pub async fn apply_watermark(input: &Path, text: &str) -> Result<()> {
    let temp = input.with_extension("wm.mp4");

    let input_str = input
        .to_str()
        .ok_or_else(|| Error::FFmpeg("Invalid path encoding for input".into()))?;
    let temp_str = temp
        .to_str()
        .ok_or_else(|| Error::FFmpeg("Invalid path encoding for temp output".into()))?;

    let drawtext = format!(
        "drawtext=text='{}':x=20:y=20:fontsize=28:fontcolor=white@0.8:shadowx=2:shadowy=2",
        escape_drawtext(text)
    );

    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-i",
            input_str,
            "-vf",
            &drawtext,
            "-codec:a",
            "copy",
            temp_str,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FFmpegNotFound
            } else {
                Error::FFmpeg(format!("Failed to run ffmpeg: {}", e))
            }
        })?;

    if !status.success() {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(Error::FFmpeg(format!(
            "ffmpeg exited with status {}",
            status
        )));
    }

    tokio::fs::rename(&temp, input).await?;

    Ok(())
}

/// Escape characters that break ffmpeg's drawtext filter syntax.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("plain"), "plain");
        assert_eq!(escape_drawtext("it's"), "it\\'s");
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
    }
}
