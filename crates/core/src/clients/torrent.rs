//! Torrent client interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClientError;

/// State of a torrent as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    Queued,
    Downloading,
    Seeding,
    Paused,
    Stalled,
    Error,
    Unknown,
}

/// Snapshot of one torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex), doubles as the client-side id.
    pub hash: String,
    pub name: String,
    pub state: TorrentState,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Directory the client saves into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Cumulative seeding time in seconds.
    pub seeding_time_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Options for submitting a torrent.
#[derive(Debug, Clone, Default)]
pub struct AddTorrentOptions {
    pub category: Option<String>,
    pub download_path: Option<String>,
}

/// Trait for torrent client backends.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Submit a torrent by URL or magnet; returns the client-side id (hash).
    async fn add_torrent(
        &self,
        url: &str,
        options: AddTorrentOptions,
    ) -> Result<String, ClientError>;

    /// Get a torrent by client-side id.
    async fn get_torrent(&self, id: &str) -> Result<TorrentInfo, ClientError>;

    /// Remove a torrent, optionally deleting downloaded data.
    async fn delete_torrent(&self, id: &str, delete_files: bool) -> Result<(), ClientError>;
}
