//! Filesystem operations for organizing downloads into the library.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tokio::fs;
use tracing::{debug, warn};

/// Audio containers the organizer recognizes.
pub const AUDIO_EXTENSIONS: &[&str] = &["m4b", "m4a", "mp3", "mp4", "aa", "aax"];

/// Cover download timeout.
pub const COVER_TIMEOUT: Duration = Duration::from_secs(30);

static COVER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(cover|folder|art)\.(jpg|jpeg|png)$").unwrap());

static RETRYABLE_IO_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ENOENT|EACCES|EPERM|no such file or directory").unwrap());

/// Whether a path carries a recognized audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_lowercase();
            AUDIO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Whether a file name looks like cover art.
pub fn is_cover_art(name: &str) -> bool {
    COVER_PATTERN.is_match(name)
}

/// Import-time errors that consume an attempt instead of failing the
/// request: the path not existing yet and permission hiccups both resolve on
/// a later retry.
pub fn is_retryable_fs_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || RETRYABLE_IO_PATTERN.is_match(&error.to_string())
}

/// Contents of a download directory relevant to the organizer.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub audio_files: Vec<PathBuf>,
    pub cover_art: Option<PathBuf>,
}

/// Recursively scan a download path for audio files and cover art.
///
/// Entries are visited in name order so results are deterministic.
pub async fn scan_download(root: &Path) -> io::Result<ScanResult> {
    let mut result = ScanResult::default();

    // The root may be a single file drop rather than a directory.
    let metadata = fs::metadata(root).await?;
    if metadata.is_file() {
        if is_audio_file(root) {
            result.audio_files.push(root.to_path_buf());
        }
        return Ok(result);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();

        for path in entries {
            let file_type = fs::metadata(&path).await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if is_audio_file(&path) {
                result.audio_files.push(path);
            } else if result.cover_art.is_none() {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                if is_cover_art(name) {
                    result.cover_art = Some(path);
                }
            }
        }
    }

    result.audio_files.sort();
    Ok(result)
}

/// Move a file into the library, preferring an atomic rename.
///
/// Cross-filesystem renames are refused by the kernel; those fall back to
/// copy + unlink.
pub async fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                "rename crossed filesystems, copying"
            );
            fs::copy(source, destination).await?;
            fs::remove_file(source).await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn is_cross_device(error: &io::Error) -> bool {
    // EXDEV is 18 on Linux.
    error.kind() == io::ErrorKind::CrossesDevices || error.raw_os_error() == Some(18)
}

/// Errors raised while fetching remote cover art.
#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Cover download timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Download cover art to `dest` with a bounded timeout. Best-effort caller
/// side; a missing cover never fails an import.
pub async fn fetch_cover(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), CoverError> {
    let fetch = async {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| CoverError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CoverError::Http(format!("HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoverError::Http(e.to_string()))?;
        fs::write(dest, &bytes).await?;
        Ok(())
    };

    match tokio::time::timeout(COVER_TIMEOUT, fetch).await {
        Ok(result) => result,
        Err(_) => {
            warn!(url, "cover download timed out");
            Err(CoverError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_extension_matching() {
        assert!(is_audio_file(Path::new("/x/book.m4b")));
        assert!(is_audio_file(Path::new("/x/Book.M4B")));
        assert!(is_audio_file(Path::new("/x/track01.mp3")));
        assert!(is_audio_file(Path::new("/x/old.aax")));
        assert!(!is_audio_file(Path::new("/x/book.epub")));
        assert!(!is_audio_file(Path::new("/x/noext")));
    }

    #[test]
    fn test_cover_art_matching() {
        assert!(is_cover_art("cover.jpg"));
        assert!(is_cover_art("Cover.JPG"));
        assert!(is_cover_art("folder.jpeg"));
        assert!(is_cover_art("art.png"));
        assert!(!is_cover_art("back-cover.jpg"));
        assert!(!is_cover_art("cover.gif"));
        assert!(!is_cover_art("cover.jpg.bak"));
    }

    #[test]
    fn test_retryable_fs_error_classification() {
        assert!(is_retryable_fs_error(&io::Error::new(
            io::ErrorKind::NotFound,
            "missing"
        )));
        assert!(is_retryable_fs_error(&io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied"
        )));
        assert!(is_retryable_fs_error(&io::Error::other(
            "ENOENT: no such file or directory"
        )));
        assert!(!is_retryable_fs_error(&io::Error::other("disk exploded")));
    }

    #[tokio::test]
    async fn test_scan_download_finds_audio_and_cover() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("disc2")).unwrap();
        std::fs::write(root.join("part1.m4b"), b"a").unwrap();
        std::fs::write(root.join("disc2/part2.m4b"), b"b").unwrap();
        std::fs::write(root.join("cover.jpg"), b"img").unwrap();
        std::fs::write(root.join("info.nfo"), b"x").unwrap();

        let scan = scan_download(root).await.unwrap();
        assert_eq!(scan.audio_files.len(), 2);
        assert_eq!(
            scan.cover_art.as_deref(),
            Some(root.join("cover.jpg").as_path())
        );
    }

    #[tokio::test]
    async fn test_scan_single_file_download() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("book.m4b");
        std::fs::write(&file, b"audio").unwrap();

        let scan = scan_download(&file).await.unwrap();
        assert_eq!(scan.audio_files, vec![file]);
        assert!(scan.cover_art.is_none());
    }

    #[tokio::test]
    async fn test_scan_missing_path_is_not_found() {
        let result = scan_download(Path::new("/definitely/not/here")).await;
        let error = result.unwrap_err();
        assert!(is_retryable_fs_error(&error));
    }

    #[tokio::test]
    async fn test_move_file_within_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.m4b");
        let dest = dir.path().join("b.m4b");
        std::fs::write(&source, b"audio").unwrap();

        move_file(&source, &dest).await.unwrap();
        assert!(!source.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"audio");
    }
}
