//! Scheduled-job storage trait.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{ScheduledJob, SeedJob};

/// Error type for scheduled-job storage operations.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Scheduled job not found: {0}")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for scheduled-job storage backends.
pub trait ScheduledJobStore: Send + Sync {
    /// Insert a definition if no row with the same name exists.
    /// Returns true when a row was inserted.
    fn seed(&self, seed: &SeedJob) -> Result<bool, ScheduleError>;

    fn get(&self, id: i64) -> Result<Option<ScheduledJob>, ScheduleError>;

    fn get_by_name(&self, name: &str) -> Result<Option<ScheduledJob>, ScheduleError>;

    fn list(&self) -> Result<Vec<ScheduledJob>, ScheduleError>;

    fn list_enabled(&self) -> Result<Vec<ScheduledJob>, ScheduleError>;

    fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), ScheduleError>;

    fn update_schedule(&self, id: i64, schedule: &str) -> Result<(), ScheduleError>;

    /// Atomically stamp `last_run = now` and `last_run_job_id`.
    fn record_run(&self, id: i64, broker_id: &str) -> Result<(), ScheduleError>;

    /// Backfill `last_run` without touching the job id (maintenance surface).
    fn set_last_run(&self, id: i64, at: DateTime<Utc>) -> Result<(), ScheduleError>;

    fn set_next_run(&self, id: i64, at: Option<DateTime<Utc>>) -> Result<(), ScheduleError>;
}
