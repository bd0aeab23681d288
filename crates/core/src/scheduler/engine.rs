//! The recurring-job scheduler.
//!
//! At startup: seed the default definitions (each row independently, a
//! failure never blocks the rest), register a repeatable broker entry per
//! enabled row, then trigger every overdue row immediately.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::jobs::JobPayload;
use crate::queue::{EnqueueOptions, QueueBroker, QueueError};

use super::cron::{self, CronError};
use super::store::{ScheduleError, ScheduledJobStore};
use super::types::{default_jobs, ScheduledJob, ScheduledJobType};

/// Errors surfaced by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] ScheduleError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Cron(#[from] CronError),
}

/// Seeds, registers and triggers recurring jobs.
pub struct Scheduler {
    store: Arc<dyn ScheduledJobStore>,
    broker: Arc<dyn QueueBroker>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn ScheduledJobStore>, broker: Arc<dyn QueueBroker>) -> Self {
        Self { store, broker }
    }

    /// Seed defaults, register enabled definitions, run overdue jobs.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.seed_defaults();

        for job in self.store.list_enabled()? {
            if let Err(e) = self.register(&job).await {
                warn!(name = %job.name, "failed to register recurring job: {e}");
            }
        }

        self.run_overdue().await?;
        Ok(())
    }

    /// Seed the default rows. Each row stands alone: log and continue on
    /// failure.
    fn seed_defaults(&self) {
        for seed in default_jobs() {
            match self.store.seed(&seed) {
                Ok(true) => info!(name = seed.name, schedule = seed.schedule, "seeded recurring job"),
                Ok(false) => {}
                Err(e) => warn!(name = seed.name, "failed to seed recurring job: {e}"),
            }
        }
    }

    /// Register the repeatable broker entry for one definition.
    /// Re-registration with the same key and cadence is idempotent.
    pub async fn register(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
        let every = cron::interval(&job.schedule)?;
        self.broker
            .register_repeatable(&job.repeatable_key(), payload_for(job), every)
            .await?;

        let next = Utc::now()
            + chrono::Duration::from_std(every).unwrap_or_else(|_| chrono::Duration::hours(24));
        self.store.set_next_run(job.id, Some(next))?;
        Ok(())
    }

    /// A job is overdue when it never ran, or its last run is older than its
    /// declared interval.
    pub fn is_overdue(job: &ScheduledJob, now: DateTime<Utc>) -> bool {
        let Ok(every) = cron::interval(&job.schedule) else {
            return false;
        };
        match job.last_run {
            None => true,
            Some(last_run) => {
                let elapsed = now.signed_duration_since(last_run);
                elapsed
                    >= chrono::Duration::from_std(every).unwrap_or_else(|_| chrono::Duration::hours(24))
            }
        }
    }

    /// Trigger every overdue enabled job immediately.
    async fn run_overdue(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        for job in self.store.list_enabled()? {
            if Self::is_overdue(&job, now) {
                info!(name = %job.name, "recurring job overdue, triggering now");
                if let Err(e) = self.trigger_job_now(job.id).await {
                    warn!(name = %job.name, "failed to trigger overdue job: {e}");
                }
            }
        }
        Ok(())
    }

    /// Enqueue one typed job for the definition and stamp its run record.
    pub async fn trigger_job_now(&self, id: i64) -> Result<String, SchedulerError> {
        let job = self.store.get(id)?.ok_or(ScheduleError::NotFound(id))?;
        let broker_id = self
            .broker
            .enqueue(payload_for(&job), EnqueueOptions::default())
            .await?;
        self.store.record_run(id, &broker_id)?;
        Ok(broker_id)
    }

    /// Enable or disable a definition.
    ///
    /// Disabling unregisters the repeatable entry before the row flips;
    /// enabling registers only after the row flips.
    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), SchedulerError> {
        let job = self.store.get(id)?.ok_or(ScheduleError::NotFound(id))?;

        if enabled {
            self.store.set_enabled(id, true)?;
            let job = self.store.get(id)?.ok_or(ScheduleError::NotFound(id))?;
            self.register(&job).await?;
        } else {
            self.broker.unregister_repeatable(&job.repeatable_key()).await;
            self.store.set_enabled(id, false)?;
            self.store.set_next_run(id, None)?;
        }
        Ok(())
    }

    /// Change a definition's cron expression, re-registering when enabled.
    pub async fn update_schedule(&self, id: i64, schedule: &str) -> Result<(), SchedulerError> {
        cron::validate(schedule)?;

        let job = self.store.get(id)?.ok_or(ScheduleError::NotFound(id))?;
        self.broker.unregister_repeatable(&job.repeatable_key()).await;
        self.store.update_schedule(id, schedule)?;

        if job.enabled {
            let job = self.store.get(id)?.ok_or(ScheduleError::NotFound(id))?;
            self.register(&job).await?;
        }
        Ok(())
    }
}

/// The typed payload a definition enqueues.
fn payload_for(job: &ScheduledJob) -> JobPayload {
    let scheduled_job_id = Some(job.id);
    match job.job_type {
        ScheduledJobType::PlexLibraryScan => JobPayload::ScanLibrary {
            library_id: None,
            partial: false,
            path: None,
        },
        ScheduledJobType::PlexRecentlyAddedCheck => {
            JobPayload::RecentlyAddedCheck { scheduled_job_id }
        }
        ScheduledJobType::AudibleRefresh => JobPayload::RefreshMetadataCache { scheduled_job_id },
        ScheduledJobType::RetryMissingTorrents => {
            JobPayload::RetryMissingSearch { scheduled_job_id }
        }
        ScheduledJobType::RetryFailedImports => JobPayload::RetryFailedImports { scheduled_job_id },
        ScheduledJobType::CleanupSeededTorrents => {
            JobPayload::CleanupSeededTorrents { scheduled_job_id }
        }
        ScheduledJobType::MonitorRssFeeds => JobPayload::MonitorRssFeeds { scheduled_job_id },
        ScheduledJobType::SyncGoodreadsShelves => JobPayload::SyncShelves { scheduled_job_id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryBroker;
    use crate::scheduler::sqlite::SqliteScheduledJobStore;

    fn scheduler() -> (Scheduler, Arc<SqliteScheduledJobStore>, Arc<MemoryBroker>) {
        let store = Arc::new(SqliteScheduledJobStore::in_memory().unwrap());
        let broker = Arc::new(MemoryBroker::new());
        let scheduler = Scheduler::new(
            Arc::clone(&store) as Arc<dyn ScheduledJobStore>,
            Arc::clone(&broker) as Arc<dyn QueueBroker>,
        );
        (scheduler, store, broker)
    }

    #[tokio::test]
    async fn test_start_seeds_and_triggers_never_run_jobs() {
        let (scheduler, store, broker) = scheduler();
        scheduler.start().await.unwrap();

        assert_eq!(store.list().unwrap().len(), 8);

        // Every enabled job has never run, so each is overdue and triggered.
        for job in store.list_enabled().unwrap() {
            assert!(job.last_run.is_some(), "{} should have run", job.name);
            assert!(job.last_run_job_id.is_some());
            assert!(job.next_run.is_some());
        }
        // Disabled jobs are untouched.
        let scan = store.get_by_name("Library Scan").unwrap().unwrap();
        assert!(scan.last_run.is_none());

        let counts = broker.counts().await;
        assert_eq!(counts.waiting, 6);
    }

    #[tokio::test]
    async fn test_start_skips_recent_jobs() {
        let (scheduler, store, _broker) = scheduler();
        scheduler.start().await.unwrap();

        let job = store.get_by_name("RSS Monitor").unwrap().unwrap();
        let first_run = job.last_run.unwrap();

        // Second startup: nothing is overdue yet.
        scheduler.start().await.unwrap();
        let job = store.get_by_name("RSS Monitor").unwrap().unwrap();
        assert_eq!(job.last_run.unwrap(), first_run);
    }

    #[tokio::test]
    async fn test_overdue_detection_boundary() {
        let (_, store, _) = scheduler();
        store.seed(&default_jobs()[6]).unwrap(); // RSS Monitor, */15
        let mut job = store.get_by_name("RSS Monitor").unwrap().unwrap();

        let now = Utc::now();
        job.last_run = Some(now - chrono::Duration::minutes(11));
        assert!(!Scheduler::is_overdue(&job, now));

        job.last_run = Some(now - chrono::Duration::minutes(16));
        assert!(Scheduler::is_overdue(&job, now));

        job.last_run = None;
        assert!(Scheduler::is_overdue(&job, now));
    }

    #[tokio::test]
    async fn test_five_minute_job_overdue_after_eleven() {
        let (_, store, _) = scheduler();
        store.seed(&default_jobs()[1]).unwrap(); // Recently Added Check, */5
        let mut job = store.get_by_name("Recently Added Check").unwrap().unwrap();

        let now = Utc::now();
        job.last_run = Some(now - chrono::Duration::minutes(11));
        assert!(Scheduler::is_overdue(&job, now));
    }

    #[tokio::test]
    async fn test_trigger_job_now_records_run() {
        let (scheduler, store, broker) = scheduler();
        store.seed(&default_jobs()[3]).unwrap();
        let job = store.get_by_name("Retry Missing Search").unwrap().unwrap();

        let broker_id = scheduler.trigger_job_now(job.id).await.unwrap();

        let job = store.get(job.id).unwrap().unwrap();
        assert_eq!(job.last_run_job_id.as_deref(), Some(broker_id.as_str()));
        assert!(job.last_run.is_some());

        let queued = broker.get_job(&broker_id).await.unwrap();
        assert_eq!(queued.job_type, crate::jobs::JobType::RetryMissingSearch);
    }

    #[tokio::test]
    async fn test_overdue_startup_trigger_after_thirty_hours() {
        let (scheduler, store, broker) = scheduler();
        // Seed without starting, then age the daily retry job by 30 hours.
        for seed in default_jobs() {
            store.seed(&seed).unwrap();
        }
        let job = store.get_by_name("Retry Missing Search").unwrap().unwrap();
        store.record_run(job.id, "old-run").unwrap();
        store
            .set_last_run(job.id, Utc::now() - chrono::Duration::hours(30))
            .unwrap();
        // Keep the others fresh so only one trigger fires.
        for other in store.list_enabled().unwrap() {
            if other.id != job.id {
                store.record_run(other.id, "fresh").unwrap();
            }
        }

        scheduler.start().await.unwrap();

        let job = store.get(job.id).unwrap().unwrap();
        assert!(job.last_run.unwrap() > Utc::now() - chrono::Duration::minutes(1));
        assert_ne!(job.last_run_job_id.as_deref(), Some("old-run"));
        assert_eq!(broker.counts().await.waiting, 1);
    }

    #[tokio::test]
    async fn test_disable_then_enable() {
        let (scheduler, store, _broker) = scheduler();
        scheduler.start().await.unwrap();
        let job = store.get_by_name("RSS Monitor").unwrap().unwrap();

        scheduler.set_enabled(job.id, false).await.unwrap();
        let job = store.get(job.id).unwrap().unwrap();
        assert!(!job.enabled);
        assert!(job.next_run.is_none());

        scheduler.set_enabled(job.id, true).await.unwrap();
        let job = store.get(job.id).unwrap().unwrap();
        assert!(job.enabled);
        assert!(job.next_run.is_some());
    }

    #[tokio::test]
    async fn test_update_schedule_validates() {
        let (scheduler, store, _) = scheduler();
        scheduler.start().await.unwrap();
        let job = store.get_by_name("RSS Monitor").unwrap().unwrap();

        assert!(scheduler.update_schedule(job.id, "bad cron").await.is_err());
        scheduler.update_schedule(job.id, "*/5 * * * *").await.unwrap();
        let job = store.get(job.id).unwrap().unwrap();
        assert_eq!(job.schedule, "*/5 * * * *");
    }
}
