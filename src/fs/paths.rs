//! Path and directory management.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default download directory when none is configured.
pub fn default_download_directory() -> PathBuf {
    if let Some(dirs) = directories::UserDirs::new() {
        if let Some(download) = dirs.download_dir() {
            return download.join("media-relay");
        }
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("downloads")
}

/// Validate and sanitize a filename by removing or replacing invalid characters.
///
/// Returns an error if the filename contains path traversal patterns.
pub fn sanitize_filename(name: &str) -> Result<String> {
    // Reject path traversal attempts
    if name.contains("..") {
        return Err(Error::InvalidFilename(format!(
            "Path traversal detected: '{}'",
            name
        )));
    }

    // Reject null bytes
    if name.contains('\0') {
        return Err(Error::InvalidFilename(format!(
            "Null bytes not allowed in filename: '{}'",
            name
        )));
    }

    // Sanitize remaining problematic characters
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Reject empty or whitespace-only names
    if sanitized.trim().is_empty() {
        return Err(Error::InvalidFilename(
            "Filename cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

/// Build the destination filename for a discovered title.
pub fn filename_for_title(title: &str, extension: &str) -> Result<String> {
    let mut name = sanitize_filename(title.trim())?;
    // Collapse runs of whitespace so filenames stay shell-friendly
    name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(format!("{}.{}", name, extension))
}

/// Temp-file path used while a transfer is in flight.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    name.push_str(".part");
    path.with_file_name(name)
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_valid() {
        assert_eq!(sanitize_filename("normal.mp4").unwrap(), "normal.mp4");
        assert_eq!(sanitize_filename("file:name.mp4").unwrap(), "file_name.mp4");
        assert_eq!(
            sanitize_filename("a/b\\c*d.mp4").unwrap(),
            "a_b_c_d.mp4"
        );
    }

    #[test]
    fn test_sanitize_filename_path_traversal() {
        assert!(sanitize_filename("../etc/passwd").is_err());
        assert!(sanitize_filename("foo/../bar").is_err());
    }

    #[test]
    fn test_sanitize_filename_empty() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("   ").is_err());
    }

    #[test]
    fn test_filename_for_title() {
        assert_eq!(
            filename_for_title("  My   Great  Video ", "mp4").unwrap(),
            "My Great Video.mp4"
        );
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/video.mp4")),
            PathBuf::from("/tmp/video.mp4.part")
        );
    }
}
