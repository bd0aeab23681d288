//! Streaming HTTP download with progress publication.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::DirectDownloadState;

/// Per-mirror attempt timeout.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum interval between progress publications.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Errors raised while streaming a direct download.
#[derive(Debug, thiserror::Error)]
pub enum DirectDownloadError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream a URL to `dest`, updating `state` per chunk and invoking
/// `on_progress` at most every [`PROGRESS_INTERVAL`].
///
/// The whole attempt is bounded by [`ATTEMPT_TIMEOUT`]; on any failure the
/// partial file is unlinked before returning.
pub async fn stream_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    state: &DirectDownloadState,
    mut on_progress: impl FnMut(u64, u64),
) -> Result<u64, DirectDownloadError> {
    let attempt = run_stream(client, url, dest, state, &mut on_progress);
    let result = match tokio::time::timeout(ATTEMPT_TIMEOUT, attempt).await {
        Ok(result) => result,
        Err(_) => Err(DirectDownloadError::Timeout(ATTEMPT_TIMEOUT)),
    };

    if result.is_err() {
        if let Err(e) = fs::remove_file(dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %dest.display(), "failed to unlink partial download: {e}");
            }
        }
    }
    result
}

async fn run_stream(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    state: &DirectDownloadState,
    on_progress: &mut impl FnMut(u64, u64),
) -> Result<u64, DirectDownloadError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DirectDownloadError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DirectDownloadError::Http(format!("HTTP {status}")));
    }

    let total = response.content_length().unwrap_or(0);
    if total > 0 {
        state.set_total(total);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(dest).await?;

    let mut downloaded = 0u64;
    let mut last_publish = Instant::now();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| DirectDownloadError::Http(e.to_string()))?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        state.record(downloaded);

        if last_publish.elapsed() >= PROGRESS_INTERVAL {
            on_progress(downloaded, total);
            last_publish = Instant::now();
        }
    }

    file.flush().await?;
    on_progress(downloaded, total);
    debug!(url, bytes = downloaded, "direct download stream finished");
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectDownloadRegistry;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Minimal one-shot HTTP server serving a fixed body.
    async fn serve_once(body: Vec<u8>, status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let header = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
        });

        format!("http://{addr}/file.epub")
    }

    #[tokio::test]
    async fn test_stream_to_file_writes_and_reports() {
        let body = vec![7u8; 64 * 1024];
        let url = serve_once(body.clone(), "HTTP/1.1 200 OK").await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book.epub");
        let registry = DirectDownloadRegistry::new();
        let state = registry.begin("d1").await;

        let client = reqwest::Client::new();
        let written = stream_to_file(&client, &url, &dest, &state, |_, _| {})
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.bytes_downloaded, body.len() as u64);
        assert_eq!(snapshot.bytes_total, body.len() as u64);
    }

    #[tokio::test]
    async fn test_http_error_unlinks_partial() {
        let url = serve_once(b"not found".to_vec(), "HTTP/1.1 404 Not Found").await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book.epub");
        let registry = DirectDownloadRegistry::new();
        let state = registry.begin("d1").await;

        let client = reqwest::Client::new();
        let result = stream_to_file(&client, &url, &dest, &state, |_, _| {}).await;

        assert!(matches!(result, Err(DirectDownloadError::Http(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_progress_callback_runs() {
        let body = vec![1u8; 8 * 1024];
        let url = serve_once(body, "HTTP/1.1 200 OK").await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book.epub");
        let registry = DirectDownloadRegistry::new();
        let state = registry.begin("d1").await;
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let client = reqwest::Client::new();
        stream_to_file(&client, &url, &dest, &state, move |_, _| {
            calls_in.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        // At least the final publication fires.
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
