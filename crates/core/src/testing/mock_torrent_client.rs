//! Mock torrent client for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{
    AddTorrentOptions, ClientError, TorrentClient, TorrentInfo, TorrentState,
};

/// Mock implementation of the TorrentClient trait.
///
/// Tracks added torrents for assertions and lets tests drive progress and
/// state:
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// let hash = client.add_torrent("http://...", Default::default()).await?;
/// client.set_progress(&hash, 1.0).await; // completes + seeds
/// ```
pub struct MockTorrentClient {
    torrents: Arc<RwLock<HashMap<String, TorrentInfo>>>,
    added: Arc<RwLock<Vec<String>>>,
    deleted: Arc<RwLock<Vec<(String, bool)>>>,
    hash_counter: Arc<RwLock<u32>>,
    next_error: Arc<RwLock<Option<ClientError>>>,
    default_save_path: String,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    pub fn new() -> Self {
        Self::with_save_path("/mock/downloads")
    }

    pub fn with_save_path(save_path: impl Into<String>) -> Self {
        Self {
            torrents: Arc::new(RwLock::new(HashMap::new())),
            added: Arc::new(RwLock::new(Vec::new())),
            deleted: Arc::new(RwLock::new(Vec::new())),
            hash_counter: Arc::new(RwLock::new(0)),
            next_error: Arc::new(RwLock::new(None)),
            default_save_path: save_path.into(),
        }
    }

    /// URLs passed to `add_torrent`, in order.
    pub async fn added_urls(&self) -> Vec<String> {
        self.added.read().await.clone()
    }

    /// Hashes removed via `delete_torrent`, with their delete-files flag.
    pub async fn deleted_torrents(&self) -> Vec<(String, bool)> {
        self.deleted.read().await.clone()
    }

    /// Fail the next client call with the given error.
    pub async fn fail_next(&self, error: ClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set progress (0.0 - 1.0); reaching 1.0 flips the torrent to seeding.
    pub async fn set_progress(&self, hash: &str, progress: f64) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.progress = progress.clamp(0.0, 1.0);
            torrent.state = if torrent.progress >= 1.0 {
                TorrentState::Seeding
            } else {
                TorrentState::Downloading
            };
        }
    }

    pub async fn set_state(&self, hash: &str, state: TorrentState) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.state = state;
        }
    }

    pub async fn set_error_message(&self, hash: &str, error: impl Into<String>) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.state = TorrentState::Error;
            torrent.error = Some(error.into());
        }
    }

    pub async fn set_seeding_time(&self, hash: &str, seconds: u64) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.seeding_time_secs = seconds;
        }
    }

    pub async fn set_name(&self, hash: &str, name: impl Into<String>) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.name = name.into();
        }
    }

    /// Insert a torrent directly (for cleanup tests that bypass add).
    pub async fn insert_torrent(&self, info: TorrentInfo) {
        self.torrents.write().await.insert(info.hash.clone(), info);
    }

    async fn take_error(&self) -> Option<ClientError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_torrent(
        &self,
        url: &str,
        _options: AddTorrentOptions,
    ) -> Result<String, ClientError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        self.added.write().await.push(url.to_string());

        let mut counter = self.hash_counter.write().await;
        *counter += 1;
        let hash = format!("hash-{:04}", *counter);
        drop(counter);

        self.torrents.write().await.insert(
            hash.clone(),
            TorrentInfo {
                hash: hash.clone(),
                name: format!("torrent-{hash}"),
                state: TorrentState::Downloading,
                progress: 0.0,
                save_path: Some(self.default_save_path.clone()),
                seeding_time_secs: 0,
                error: None,
            },
        );
        Ok(hash)
    }

    async fn get_torrent(&self, id: &str) -> Result<TorrentInfo, ClientError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        self.torrents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    async fn delete_torrent(&self, id: &str, delete_files: bool) -> Result<(), ClientError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        self.deleted
            .write()
            .await
            .push((id.to_string(), delete_files));
        self.torrents.write().await.remove(id);
        Ok(())
    }
}
