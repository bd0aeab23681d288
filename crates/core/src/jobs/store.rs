//! Job store trait: the persistent audit surface for broker jobs.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Job, JobPayload, JobStatus};

/// Error type for job storage operations.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Fields for creating a job row when a broker job is enqueued.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub broker_id: String,
    pub payload: JobPayload,
    pub priority: i32,
    pub max_attempts: u32,
}

/// Partial update applied by broker id.
///
/// Re-applying a patch with the same status and result is idempotent: the row
/// ends up identical.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub attempts: Option<u32>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,
    /// Clears both error columns (used by explicit retry).
    pub clear_errors: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// The broker picked the job up for an attempt.
    pub fn active(attempt: u32) -> Self {
        Self {
            status: Some(JobStatus::Active),
            attempts: Some(attempt),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// The handler returned a result.
    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result: Some(result),
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// The handler failed terminally or exhausted its attempts.
    pub fn failed(error: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(error.into()),
            error_detail: detail,
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// A retryable failure with attempts remaining: back to pending with the
    /// error recorded; the row is re-patched when the next attempt starts.
    pub fn retry_scheduled(error: impl Into<String>, attempt: u32) -> Self {
        Self {
            status: Some(JobStatus::Pending),
            attempts: Some(attempt),
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    /// The worker task died without reporting.
    pub fn stuck() -> Self {
        Self {
            status: Some(JobStatus::Stuck),
            ..Default::default()
        }
    }

    /// Explicit operator retry resets the row.
    pub fn retried() -> Self {
        Self {
            status: Some(JobStatus::Pending),
            attempts: Some(0),
            clear_errors: true,
            ..Default::default()
        }
    }

    /// The job was removed before running.
    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            ..Default::default()
        }
    }
}

/// Trait for job storage backends.
///
/// This is an audit and cross-reference surface only; queue ordering lives in
/// the broker.
pub trait JobStore: Send + Sync {
    /// Record a newly enqueued broker job.
    fn create(&self, job: NewJob) -> Result<Job, JobError>;

    /// Apply a patch to the row owning the broker id.
    fn update_by_broker_id(&self, broker_id: &str, patch: &JobPatch) -> Result<(), JobError>;

    fn find_by_id(&self, id: i64) -> Result<Option<Job>, JobError>;

    fn find_by_broker_id(&self, broker_id: &str) -> Result<Option<Job>, JobError>;

    /// All jobs recorded for a request, newest first.
    fn find_by_request(&self, request_id: &str) -> Result<Vec<Job>, JobError>;

    /// Most recent failed jobs.
    fn find_failed(&self, limit: i64) -> Result<Vec<Job>, JobError>;
}
