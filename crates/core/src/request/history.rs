//! Download history: one row per selected candidate for a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::DownloadClientKind;

/// Transfer status tracked on a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DownloadStatus::Pending),
            "downloading" => Some(DownloadStatus::Downloading),
            "completed" => Some(DownloadStatus::Completed),
            "failed" => Some(DownloadStatus::Failed),
            _ => None,
        }
    }
}

/// One selected candidate and its client-side handles and paths.
///
/// `download_path` is captured when the client reports completion and is the
/// authoritative import source for organize retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadHistory {
    pub id: i64,
    pub request_id: String,
    /// At most one selected row per request.
    pub selected: bool,
    pub download_client: DownloadClientKind,
    pub download_client_id: Option<String>,
    pub torrent_hash: Option<String>,
    pub nzb_id: Option<String>,
    /// Base name of the download as the client reports it.
    pub torrent_name: Option<String>,
    pub download_path: Option<String>,
    pub indexer_name: Option<String>,
    /// Source URL; a JSON array of mirror URLs for direct downloads.
    pub torrent_url: Option<String>,
    pub download_status: DownloadStatus,
    pub download_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields for recording a newly selected candidate.
#[derive(Debug, Clone)]
pub struct NewDownloadHistory {
    pub request_id: String,
    pub download_client: DownloadClientKind,
    pub download_client_id: Option<String>,
    pub torrent_hash: Option<String>,
    pub nzb_id: Option<String>,
    pub torrent_name: Option<String>,
    pub indexer_name: Option<String>,
    pub torrent_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_status_round_trip() {
        for status in [
            DownloadStatus::Pending,
            DownloadStatus::Downloading,
            DownloadStatus::Completed,
            DownloadStatus::Failed,
        ] {
            assert_eq!(DownloadStatus::parse(status.as_str()), Some(status));
        }
    }
}
