//! Request storage trait and query types.

use thiserror::Error;

use super::history::{DownloadHistory, DownloadStatus, NewDownloadHistory};
use super::types::{Audiobook, NewAudiobook, Request, RequestStatus, RequestType};

/// Error type for request storage operations.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request not found: {0}")]
    NotFound(String),

    #[error("Audiobook not found: {0}")]
    AudiobookNotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Request to create a new acquisition request.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub user_id: String,
    pub request_type: RequestType,
    pub audiobook_id: String,
    /// Override for the organize retry budget (default 3).
    pub max_import_retries: Option<u32>,
}

/// Filter for querying requests. Soft-deleted rows are always excluded.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub request_type: Option<RequestType>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            request_type: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Storage for requests, their audiobook descriptors and download history.
///
/// `transition` is the single write path for status changes: it re-reads the
/// row, refuses soft-deleted rows and illegal edges, and applies the change
/// atomically. Refusal returns `Ok(None)` so concurrent processors degrade
/// to no-ops.
pub trait RequestStore: Send + Sync {
    // --- requests ---

    fn create_request(&self, request: NewRequest) -> Result<Request, RequestError>;

    fn get_request(&self, id: &str) -> Result<Option<Request>, RequestError>;

    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, RequestError>;

    fn count_requests(&self, filter: &RequestFilter) -> Result<i64, RequestError>;

    /// Compare-and-swap status change. The current status must be in `from`
    /// and the edge must be legal per the transition table.
    fn transition(
        &self,
        id: &str,
        from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<Option<Request>, RequestError>;

    /// Monotone progress write; lower values than the stored one are ignored.
    fn set_progress(&self, id: &str, progress: u8) -> Result<(), RequestError>;

    fn set_error_message(&self, id: &str, message: Option<&str>) -> Result<(), RequestError>;

    /// Count an empty search round; returns the new total.
    fn bump_download_attempts(&self, id: &str) -> Result<u32, RequestError>;

    /// Count an organize attempt and stamp `last_import_at`; returns the new
    /// total.
    fn bump_import_attempts(&self, id: &str) -> Result<u32, RequestError>;

    fn soft_delete(&self, id: &str) -> Result<(), RequestError>;

    /// Permanently remove a request; its history rows cascade. Job audit
    /// rows are retained independently.
    fn hard_delete(&self, id: &str) -> Result<(), RequestError>;

    // --- audiobooks ---

    fn create_audiobook(&self, audiobook: NewAudiobook) -> Result<Audiobook, RequestError>;

    fn get_audiobook(&self, id: &str) -> Result<Option<Audiobook>, RequestError>;

    fn set_audiobook_year(&self, id: &str, year: i32) -> Result<(), RequestError>;

    fn set_audiobook_file_path(&self, id: &str, path: &str) -> Result<(), RequestError>;

    fn set_audiobook_library_match(
        &self,
        id: &str,
        guid: &str,
        rating_key: &str,
    ) -> Result<(), RequestError>;

    // --- download history ---

    /// Record a newly selected candidate; clears `selected` on every other
    /// row of the request in the same transaction.
    fn insert_history(&self, row: NewDownloadHistory) -> Result<DownloadHistory, RequestError>;

    fn get_history(&self, id: i64) -> Result<Option<DownloadHistory>, RequestError>;

    /// Most recent selected row for a request; the reference for organize
    /// retries.
    fn latest_selected_history(
        &self,
        request_id: &str,
    ) -> Result<Option<DownloadHistory>, RequestError>;

    fn update_history_status(
        &self,
        id: i64,
        status: DownloadStatus,
        error: Option<&str>,
    ) -> Result<(), RequestError>;

    fn set_history_client(
        &self,
        id: i64,
        client_id: &str,
        torrent_hash: Option<&str>,
        nzb_id: Option<&str>,
    ) -> Result<(), RequestError>;

    /// Persist the absolute download path (and name) the client reported at
    /// completion time.
    fn set_history_download_path(
        &self,
        id: i64,
        path: &str,
        name: Option<&str>,
    ) -> Result<(), RequestError>;
}
