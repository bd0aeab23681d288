//! Direct (HTTP) download engine for e-book sidecars.
//!
//! Transfers stream straight to the download dir; state lives in an
//! in-memory registry keyed by an opaque id. The streaming task is the only
//! writer; monitors read atomic snapshots, so no lock guards the counters.

mod stream;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

pub use stream::{stream_to_file, DirectDownloadError, ATTEMPT_TIMEOUT, PROGRESS_INTERVAL};

/// Live state of one direct download. Word-sized fields only.
pub struct DirectDownloadState {
    started_at: DateTime<Utc>,
    bytes_downloaded: AtomicU64,
    bytes_total: AtomicU64,
    last_update_ms: AtomicI64,
    completed: AtomicBool,
    failed: AtomicBool,
}

impl DirectDownloadState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            bytes_downloaded: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            last_update_ms: AtomicI64::new(now.timestamp_millis()),
            completed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    pub fn set_total(&self, total: u64) {
        self.bytes_total.store(total, Ordering::Relaxed);
    }

    pub fn record(&self, bytes_downloaded: u64) {
        self.bytes_downloaded.store(bytes_downloaded, Ordering::Relaxed);
        self.last_update_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::Relaxed);
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DirectDownloadProgress {
        DirectDownloadProgress {
            started_at: self.started_at,
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            last_update_ms: self.last_update_ms.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one direct download.
#[derive(Debug, Clone, Copy)]
pub struct DirectDownloadProgress {
    pub started_at: DateTime<Utc>,
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    pub last_update_ms: i64,
    pub completed: bool,
    pub failed: bool,
}

impl DirectDownloadProgress {
    /// Percent complete, capped at 99 while streaming and 100 once finished.
    pub fn percent(&self) -> u8 {
        if self.completed {
            return 100;
        }
        if self.bytes_total == 0 {
            return 0;
        }
        let pct = (self.bytes_downloaded as f64 / self.bytes_total as f64 * 100.0) as u8;
        pct.min(99)
    }
}

/// Registry of in-flight direct downloads.
#[derive(Default)]
pub struct DirectDownloadRegistry {
    downloads: RwLock<HashMap<String, Arc<DirectDownloadState>>>,
}

impl DirectDownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new download and return its live state.
    pub async fn begin(&self, id: &str) -> Arc<DirectDownloadState> {
        let state = Arc::new(DirectDownloadState::new());
        self.downloads
            .write()
            .await
            .insert(id.to_string(), Arc::clone(&state));
        state
    }

    pub async fn get(&self, id: &str) -> Option<Arc<DirectDownloadState>> {
        self.downloads.read().await.get(id).cloned()
    }

    pub async fn snapshot(&self, id: &str) -> Option<DirectDownloadProgress> {
        self.downloads.read().await.get(id).map(|s| s.snapshot())
    }

    pub async fn remove(&self, id: &str) {
        self.downloads.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = DirectDownloadRegistry::new();
        let state = registry.begin("d1").await;
        state.set_total(1000);
        state.record(500);

        let snapshot = registry.snapshot("d1").await.unwrap();
        assert_eq!(snapshot.bytes_downloaded, 500);
        assert_eq!(snapshot.bytes_total, 1000);
        assert_eq!(snapshot.percent(), 50);
        assert!(!snapshot.completed);

        registry.remove("d1").await;
        assert!(registry.snapshot("d1").await.is_none());
    }

    #[tokio::test]
    async fn test_percent_caps_at_99_until_completed() {
        let registry = DirectDownloadRegistry::new();
        let state = registry.begin("d1").await;
        state.set_total(100);
        state.record(100);

        assert_eq!(state.snapshot().percent(), 99);
        state.mark_completed();
        assert_eq!(state.snapshot().percent(), 100);
    }

    #[tokio::test]
    async fn test_percent_with_unknown_total() {
        let registry = DirectDownloadRegistry::new();
        let state = registry.begin("d1").await;
        state.record(4096);
        assert_eq!(state.snapshot().percent(), 0);
    }
}
