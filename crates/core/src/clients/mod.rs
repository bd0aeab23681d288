//! Abstract interfaces for external collaborators.
//!
//! The pipeline talks to an indexer aggregator, download clients, a media
//! server, a metadata provider, an e-book scraper and a notification bus.
//! Only their capability surfaces are modeled here; deployments plug in
//! concrete backends.

mod download;
mod indexer;
mod library;
mod metadata;
mod notify;
mod scraper;
mod torrent;
mod types;
mod usenet;

use std::sync::Arc;

use thiserror::Error;

pub use download::{
    DownloadClient, DownloadHandle, DownloadSnapshot, DownloadState, TorrentDownloadAdapter,
    UsenetDownloadAdapter,
};
pub use indexer::IndexerAggregator;
pub use library::{LibraryItem, MediaLibrary};
pub use metadata::{CatalogEntry, MetadataProvider};
pub use notify::{NotificationBus, NotificationKind};
pub use scraper::{EbookScraper, ResolvedDownload};
pub use torrent::{AddTorrentOptions, TorrentClient, TorrentInfo, TorrentState};
pub use types::{DownloadClientKind, Protocol, ReleaseCandidate, ReleaseQuery, RssItem};
pub use usenet::{NzbInfo, NzbState, UsenetClient};

/// Errors surfaced by external clients.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} is not configured")]
    Unconfigured(&'static str),
}

impl ClientError {
    /// Whether a broker retry can plausibly succeed.
    ///
    /// Timeouts, connection failures and upstream API errors are transient;
    /// missing entities and missing configuration are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout | ClientError::ConnectionFailed(_) | ClientError::ApiError(_)
        )
    }
}

/// The set of external clients available to processors.
///
/// Every entry is optional: an unconfigured collaborator makes the processors
/// that need it skip their work instead of failing requests.
#[derive(Clone, Default)]
pub struct ClientSet {
    pub indexer: Option<Arc<dyn IndexerAggregator>>,
    pub torrent: Option<Arc<dyn TorrentClient>>,
    pub usenet: Option<Arc<dyn UsenetClient>>,
    pub library: Option<Arc<dyn MediaLibrary>>,
    pub metadata: Option<Arc<dyn MetadataProvider>>,
    pub scraper: Option<Arc<dyn EbookScraper>>,
    pub notifier: Option<Arc<dyn NotificationBus>>,
}

impl ClientSet {
    /// Resolve the common download capability for a client kind.
    ///
    /// Direct downloads have no remote client to query; their paths come from
    /// the in-memory registry and the stored history row.
    pub fn download_client(&self, kind: DownloadClientKind) -> Option<Arc<dyn DownloadClient>> {
        match kind {
            DownloadClientKind::Qbittorrent => self
                .torrent
                .clone()
                .map(|c| Arc::new(TorrentDownloadAdapter::new(c)) as Arc<dyn DownloadClient>),
            DownloadClientKind::Sabnzbd => self
                .usenet
                .clone()
                .map(|c| Arc::new(UsenetDownloadAdapter::new(c)) as Arc<dyn DownloadClient>),
            DownloadClientKind::Direct => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionFailed("refused".into()).is_retryable());
        assert!(ClientError::ApiError("HTTP 502".into()).is_retryable());
        assert!(!ClientError::NotFound("t1".into()).is_retryable());
        assert!(!ClientError::Unconfigured("indexer").is_retryable());
    }

    #[test]
    fn test_empty_client_set_has_no_download_clients() {
        let set = ClientSet::default();
        assert!(set.download_client(DownloadClientKind::Qbittorrent).is_none());
        assert!(set.download_client(DownloadClientKind::Sabnzbd).is_none());
        assert!(set.download_client(DownloadClientKind::Direct).is_none());
    }
}
