//! Core request and audiobook data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of media a request acquires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Audiobook,
    Ebook,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Audiobook => "audiobook",
            RequestType::Ebook => "ebook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audiobook" => Some(RequestType::Audiobook),
            "ebook" => Some(RequestType::Ebook),
            _ => None,
        }
    }
}

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    AwaitingSearch,
    AwaitingDownload,
    Downloading,
    AwaitingImport,
    Processing,
    Downloaded,
    Completed,
    Warn,
    Failed,
    Cancelled,
}

impl RequestStatus {
    /// Returns true for states that never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled
        )
    }

    /// Returns true when automation must leave the request alone.
    /// `warn` halts processors but stays manually restartable.
    pub fn halts_automation(&self) -> bool {
        self.is_terminal() || matches!(self, RequestStatus::Warn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::AwaitingSearch => "awaiting_search",
            RequestStatus::AwaitingDownload => "awaiting_download",
            RequestStatus::Downloading => "downloading",
            RequestStatus::AwaitingImport => "awaiting_import",
            RequestStatus::Processing => "processing",
            RequestStatus::Downloaded => "downloaded",
            RequestStatus::Completed => "completed",
            RequestStatus::Warn => "warn",
            RequestStatus::Failed => "failed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_search" => Some(RequestStatus::AwaitingSearch),
            "awaiting_download" => Some(RequestStatus::AwaitingDownload),
            "downloading" => Some(RequestStatus::Downloading),
            "awaiting_import" => Some(RequestStatus::AwaitingImport),
            "processing" => Some(RequestStatus::Processing),
            "downloaded" => Some(RequestStatus::Downloaded),
            "completed" => Some(RequestStatus::Completed),
            "warn" => Some(RequestStatus::Warn),
            "failed" => Some(RequestStatus::Failed),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }
}

/// Audiobook descriptor a request targets.
///
/// `file_path` and the library handle are written later by the organizer and
/// the library matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Audiobook {
    pub id: String,
    pub title: String,
    pub author: String,
    pub narrator: Option<String>,
    pub asin: Option<String>,
    pub series: Option<String>,
    pub series_part: Option<String>,
    pub year: Option<i32>,
    pub cover_art_url: Option<String>,
    /// Final library directory, set on organize success.
    pub file_path: Option<String>,
    /// External library identifiers, set on a confirmed match.
    pub library_guid: Option<String>,
    pub library_rating_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating an audiobook descriptor.
#[derive(Debug, Clone, Default)]
pub struct NewAudiobook {
    pub title: String,
    pub author: String,
    pub narrator: Option<String>,
    pub asin: Option<String>,
    pub series: Option<String>,
    pub series_part: Option<String>,
    pub year: Option<i32>,
    pub cover_art_url: Option<String>,
}

/// A user's request to acquire a title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: String,
    pub user_id: String,
    pub request_type: RequestType,
    pub audiobook_id: String,
    pub status: RequestStatus,
    /// Percent complete, monotone until a terminal state.
    pub progress: u8,
    /// Empty search rounds consumed so far.
    pub download_attempts: u32,
    /// Organize attempts consumed so far.
    pub import_attempts: u32,
    pub max_import_retries: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_import_at: Option<DateTime<Utc>>,
    /// Soft delete: non-null hides the row from every processor.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Request {
    /// Whether any processor may act on this request at all.
    pub fn is_actionable(&self) -> bool {
        self.deleted_at.is_none() && !self.status.halts_automation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Warn.is_terminal());
        assert!(!RequestStatus::Downloading.is_terminal());
    }

    #[test]
    fn test_warn_halts_automation_but_is_not_terminal() {
        assert!(RequestStatus::Warn.halts_automation());
        assert!(!RequestStatus::Warn.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RequestStatus::AwaitingSearch,
            RequestStatus::AwaitingDownload,
            RequestStatus::Downloading,
            RequestStatus::AwaitingImport,
            RequestStatus::Processing,
            RequestStatus::Downloaded,
            RequestStatus::Completed,
            RequestStatus::Warn,
            RequestStatus::Failed,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("unknown"), None);
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        let json = serde_json::to_string(&RequestStatus::AwaitingSearch).unwrap();
        assert_eq!(json, "\"awaiting_search\"");
    }
}
