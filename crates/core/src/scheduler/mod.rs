//! Recurring jobs: definitions, cron subset, storage and the scheduler.

pub mod cron;
mod engine;
mod sqlite;
mod store;
mod types;

pub use cron::CronError;
pub use engine::{Scheduler, SchedulerError};
pub use sqlite::SqliteScheduledJobStore;
pub use store::{ScheduleError, ScheduledJobStore};
pub use types::{default_jobs, ScheduledJob, ScheduledJobType, SeedJob};
