//! Durable job records and typed payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::{DownloadClientKind, NotificationKind, ReleaseCandidate};

/// Status of a job as mirrored from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Stuck,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stuck => "stuck",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "stuck" => Some(JobStatus::Stuck),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// Every job type the pipeline dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    SearchIndexers,
    DownloadTorrent,
    MonitorDownload,
    StartDirectDownload,
    MonitorDirectDownload,
    OrganizeFiles,
    ScanLibrary,
    MatchLibrary,
    SendNotification,
    RetryMissingSearch,
    RetryFailedImports,
    MonitorRssFeeds,
    CleanupSeededTorrents,
    RefreshMetadataCache,
    RecentlyAddedCheck,
    SyncShelves,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SearchIndexers => "search_indexers",
            JobType::DownloadTorrent => "download_torrent",
            JobType::MonitorDownload => "monitor_download",
            JobType::StartDirectDownload => "start_direct_download",
            JobType::MonitorDirectDownload => "monitor_direct_download",
            JobType::OrganizeFiles => "organize_files",
            JobType::ScanLibrary => "scan_library",
            JobType::MatchLibrary => "match_library",
            JobType::SendNotification => "send_notification",
            JobType::RetryMissingSearch => "retry_missing_search",
            JobType::RetryFailedImports => "retry_failed_imports",
            JobType::MonitorRssFeeds => "monitor_rss_feeds",
            JobType::CleanupSeededTorrents => "cleanup_seeded_torrents",
            JobType::RefreshMetadataCache => "refresh_metadata_cache",
            JobType::RecentlyAddedCheck => "recently_added_check",
            JobType::SyncShelves => "sync_shelves",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "search_indexers" => Some(JobType::SearchIndexers),
            "download_torrent" => Some(JobType::DownloadTorrent),
            "monitor_download" => Some(JobType::MonitorDownload),
            "start_direct_download" => Some(JobType::StartDirectDownload),
            "monitor_direct_download" => Some(JobType::MonitorDirectDownload),
            "organize_files" => Some(JobType::OrganizeFiles),
            "scan_library" => Some(JobType::ScanLibrary),
            "match_library" => Some(JobType::MatchLibrary),
            "send_notification" => Some(JobType::SendNotification),
            "retry_missing_search" => Some(JobType::RetryMissingSearch),
            "retry_failed_imports" => Some(JobType::RetryFailedImports),
            "monitor_rss_feeds" => Some(JobType::MonitorRssFeeds),
            "cleanup_seeded_torrents" => Some(JobType::CleanupSeededTorrents),
            "refresh_metadata_cache" => Some(JobType::RefreshMetadataCache),
            "recently_added_check" => Some(JobType::RecentlyAddedCheck),
            "sync_shelves" => Some(JobType::SyncShelves),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The audiobook fields search payloads carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudiobookRef {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
}

/// Typed job payload, tagged by job type.
///
/// Persisted as JSON (opaque to the broker); processors bind to the typed
/// shape at entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    SearchIndexers {
        request_id: String,
        audiobook: AudiobookRef,
    },
    DownloadTorrent {
        request_id: String,
        audiobook: AudiobookRef,
        release: ReleaseCandidate,
    },
    MonitorDownload {
        request_id: String,
        download_history_id: i64,
        download_client_id: String,
        download_client: DownloadClientKind,
    },
    StartDirectDownload {
        request_id: String,
        download_history_id: i64,
        mirror_urls: Vec<String>,
        target_filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected_size: Option<u64>,
    },
    MonitorDirectDownload {
        request_id: String,
        download_history_id: i64,
        download_id: String,
        target_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected_size: Option<u64>,
    },
    OrganizeFiles {
        request_id: String,
        audiobook_id: String,
        download_path: String,
    },
    ScanLibrary {
        #[serde(skip_serializing_if = "Option::is_none")]
        library_id: Option<String>,
        #[serde(default)]
        partial: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    MatchLibrary {
        request_id: String,
        audiobook_id: String,
        title: String,
        author: String,
    },
    SendNotification {
        kind: NotificationKind,
        payload: serde_json::Value,
    },
    RetryMissingSearch {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheduled_job_id: Option<i64>,
    },
    RetryFailedImports {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheduled_job_id: Option<i64>,
    },
    MonitorRssFeeds {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheduled_job_id: Option<i64>,
    },
    CleanupSeededTorrents {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheduled_job_id: Option<i64>,
    },
    RefreshMetadataCache {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheduled_job_id: Option<i64>,
    },
    RecentlyAddedCheck {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheduled_job_id: Option<i64>,
    },
    SyncShelves {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheduled_job_id: Option<i64>,
    },
}

impl JobPayload {
    /// The job type this payload dispatches to.
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::SearchIndexers { .. } => JobType::SearchIndexers,
            JobPayload::DownloadTorrent { .. } => JobType::DownloadTorrent,
            JobPayload::MonitorDownload { .. } => JobType::MonitorDownload,
            JobPayload::StartDirectDownload { .. } => JobType::StartDirectDownload,
            JobPayload::MonitorDirectDownload { .. } => JobType::MonitorDirectDownload,
            JobPayload::OrganizeFiles { .. } => JobType::OrganizeFiles,
            JobPayload::ScanLibrary { .. } => JobType::ScanLibrary,
            JobPayload::MatchLibrary { .. } => JobType::MatchLibrary,
            JobPayload::SendNotification { .. } => JobType::SendNotification,
            JobPayload::RetryMissingSearch { .. } => JobType::RetryMissingSearch,
            JobPayload::RetryFailedImports { .. } => JobType::RetryFailedImports,
            JobPayload::MonitorRssFeeds { .. } => JobType::MonitorRssFeeds,
            JobPayload::CleanupSeededTorrents { .. } => JobType::CleanupSeededTorrents,
            JobPayload::RefreshMetadataCache { .. } => JobType::RefreshMetadataCache,
            JobPayload::RecentlyAddedCheck { .. } => JobType::RecentlyAddedCheck,
            JobPayload::SyncShelves { .. } => JobType::SyncShelves,
        }
    }

    /// The request this job belongs to, when it is request-scoped.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            JobPayload::SearchIndexers { request_id, .. }
            | JobPayload::DownloadTorrent { request_id, .. }
            | JobPayload::MonitorDownload { request_id, .. }
            | JobPayload::StartDirectDownload { request_id, .. }
            | JobPayload::MonitorDirectDownload { request_id, .. }
            | JobPayload::OrganizeFiles { request_id, .. }
            | JobPayload::MatchLibrary { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// Durable audit record of one scheduled unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    /// Broker-side handle.
    pub broker_id: String,
    pub request_id: Option<String>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub payload: JobPayload,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Full error chain for operator debugging.
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tag_matches_job_type() {
        let payload = JobPayload::SearchIndexers {
            request_id: "r1".to_string(),
            audiobook: AudiobookRef {
                id: "a1".to_string(),
                title: "Mistborn".to_string(),
                author: "Brandon Sanderson".to_string(),
                asin: None,
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], payload.job_type().as_str());
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = JobPayload::OrganizeFiles {
            request_id: "r1".to_string(),
            audiobook_id: "a1".to_string(),
            download_path: "/downloads/Release".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.request_id(), Some("r1"));
    }

    #[test]
    fn test_recurring_payloads_have_no_request() {
        let payload = JobPayload::MonitorRssFeeds {
            scheduled_job_id: Some(7),
        };
        assert_eq!(payload.request_id(), None);
        assert_eq!(payload.job_type(), JobType::MonitorRssFeeds);
    }

    #[test]
    fn test_job_type_round_trip() {
        for t in [
            JobType::SearchIndexers,
            JobType::DownloadTorrent,
            JobType::MonitorDownload,
            JobType::StartDirectDownload,
            JobType::MonitorDirectDownload,
            JobType::OrganizeFiles,
            JobType::ScanLibrary,
            JobType::MatchLibrary,
            JobType::SendNotification,
            JobType::RetryMissingSearch,
            JobType::RetryFailedImports,
            JobType::MonitorRssFeeds,
            JobType::CleanupSeededTorrents,
            JobType::RefreshMetadataCache,
            JobType::RecentlyAddedCheck,
            JobType::SyncShelves,
        ] {
            assert_eq!(JobType::parse(t.as_str()), Some(t));
        }
    }
}
