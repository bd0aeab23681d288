//! Common download capability over torrent and usenet clients.
//!
//! Retry jobs need "where is this transfer and how far along is it" without
//! branching per protocol at the call site; adapters project each client
//! onto this one surface.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::torrent::{TorrentClient, TorrentState};
use super::usenet::{NzbState, UsenetClient};
use super::ClientError;

/// Identifiers for one transfer across client kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadHandle {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nzb_id: Option<String>,
}

impl DownloadHandle {
    /// The strongest identifier available for a torrent lookup.
    fn torrent_key(&self) -> &str {
        self.torrent_hash.as_deref().unwrap_or(&self.client_id)
    }

    fn nzb_key(&self) -> &str {
        self.nzb_id.as_deref().unwrap_or(&self.client_id)
    }
}

/// Coarse transfer state shared across client kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Queued,
    Downloading,
    Completed,
    Failed,
}

/// Snapshot of one transfer as seen through the common capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Absolute path of the downloaded content, when the client knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
    pub state: DownloadState,
    /// Progress (0.0 - 1.0).
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeding_time_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Common read-only capability over download clients.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Look up one transfer. `Ok(None)` means the client no longer knows it.
    async fn get_download(
        &self,
        handle: &DownloadHandle,
    ) -> Result<Option<DownloadSnapshot>, ClientError>;
}

/// Projects a torrent client onto the common capability.
pub struct TorrentDownloadAdapter {
    client: Arc<dyn TorrentClient>,
}

impl TorrentDownloadAdapter {
    pub fn new(client: Arc<dyn TorrentClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DownloadClient for TorrentDownloadAdapter {
    async fn get_download(
        &self,
        handle: &DownloadHandle,
    ) -> Result<Option<DownloadSnapshot>, ClientError> {
        let info = match self.client.get_torrent(handle.torrent_key()).await {
            Ok(info) => info,
            Err(ClientError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let state = match info.state {
            TorrentState::Seeding => DownloadState::Completed,
            _ if info.progress >= 1.0 => DownloadState::Completed,
            TorrentState::Error => DownloadState::Failed,
            TorrentState::Queued => DownloadState::Queued,
            _ => DownloadState::Downloading,
        };

        let download_path = info
            .save_path
            .as_ref()
            .map(|base| join_reported_path(base, &info.name));

        Ok(Some(DownloadSnapshot {
            name: Some(info.name),
            download_path,
            state,
            progress: info.progress,
            seeding_time_secs: Some(info.seeding_time_secs),
            error: info.error,
        }))
    }
}

/// Projects a usenet client onto the common capability.
pub struct UsenetDownloadAdapter {
    client: Arc<dyn UsenetClient>,
}

impl UsenetDownloadAdapter {
    pub fn new(client: Arc<dyn UsenetClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DownloadClient for UsenetDownloadAdapter {
    async fn get_download(
        &self,
        handle: &DownloadHandle,
    ) -> Result<Option<DownloadSnapshot>, ClientError> {
        let info = match self.client.get_nzb(handle.nzb_key()).await {
            Ok(info) => info,
            Err(ClientError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let state = match info.state {
            NzbState::Completed => DownloadState::Completed,
            NzbState::Failed => DownloadState::Failed,
            NzbState::Queued => DownloadState::Queued,
            NzbState::Downloading | NzbState::Extracting => DownloadState::Downloading,
        };

        Ok(Some(DownloadSnapshot {
            name: Some(info.name),
            download_path: info.download_path,
            state,
            progress: info.progress,
            seeding_time_secs: None,
            error: info.error,
        }))
    }
}

/// Join a client-reported save path and content name without normalizing the
/// reported separator style.
fn join_reported_path(base: &str, name: &str) -> String {
    if base.ends_with('/') || base.ends_with('\\') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}
