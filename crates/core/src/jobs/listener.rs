//! Broker lifecycle events mapped onto Job Store patches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::queue::{EnqueueOptions, QueueListener};
use crate::scheduler::ScheduledJobStore;

use super::store::{JobPatch, JobStore, NewJob};
use super::types::JobPayload;

/// Records every broker lifecycle event as a Job Store patch, and forwards
/// repeatable firings into the scheduled-job bookkeeping.
pub struct StoreListener {
    jobs: Arc<dyn JobStore>,
    scheduled: Option<Arc<dyn ScheduledJobStore>>,
}

impl StoreListener {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            jobs,
            scheduled: None,
        }
    }

    /// Attach the scheduled-job store so repeatable firings update last-run
    /// bookkeeping.
    pub fn with_scheduled_store(mut self, scheduled: Arc<dyn ScheduledJobStore>) -> Self {
        self.scheduled = Some(scheduled);
        self
    }
}

#[async_trait]
impl QueueListener for StoreListener {
    async fn on_enqueued(&self, broker_id: &str, payload: &JobPayload, options: &EnqueueOptions) {
        let job = NewJob {
            broker_id: broker_id.to_string(),
            payload: payload.clone(),
            priority: options.priority,
            max_attempts: options.attempts,
        };
        if let Err(e) = self.jobs.create(job) {
            warn!(broker_id, "failed to record enqueued job: {e}");
        }
    }

    async fn on_active(&self, broker_id: &str, attempt: u32) {
        if let Err(e) = self.jobs.update_by_broker_id(broker_id, &JobPatch::active(attempt)) {
            warn!(broker_id, "failed to record active job: {e}");
        }
    }

    async fn on_completed(&self, broker_id: &str, result: &serde_json::Value) {
        if let Err(e) = self
            .jobs
            .update_by_broker_id(broker_id, &JobPatch::completed(result.clone()))
        {
            warn!(broker_id, "failed to record completed job: {e}");
        }
    }

    async fn on_retry_scheduled(&self, broker_id: &str, error: &str, attempt: u32, delay: Duration) {
        debug!(broker_id, attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
        if let Err(e) = self
            .jobs
            .update_by_broker_id(broker_id, &JobPatch::retry_scheduled(error, attempt))
        {
            warn!(broker_id, "failed to record retry: {e}");
        }
    }

    async fn on_failed(&self, broker_id: &str, error: &str, detail: Option<&str>) {
        let patch = JobPatch::failed(error, detail.map(|d| d.to_string()));
        if let Err(e) = self.jobs.update_by_broker_id(broker_id, &patch) {
            warn!(broker_id, "failed to record failed job: {e}");
        }
    }

    async fn on_stalled(&self, broker_id: &str) {
        if let Err(e) = self.jobs.update_by_broker_id(broker_id, &JobPatch::stuck()) {
            warn!(broker_id, "failed to record stalled job: {e}");
        }
    }

    async fn on_repeatable_fired(&self, key: &str, broker_id: &str) {
        let Some(scheduled) = &self.scheduled else {
            return;
        };
        // Repeatable keys are `scheduled-{id}`.
        let Some(id) = key.strip_prefix("scheduled-").and_then(|s| s.parse::<i64>().ok()) else {
            warn!(key, "repeatable fired with unrecognized key");
            return;
        };
        if let Err(e) = scheduled.record_run(id, broker_id) {
            warn!(key, "failed to record scheduled run: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::sqlite::SqliteJobStore;
    use crate::jobs::types::JobStatus;

    fn payload() -> JobPayload {
        JobPayload::RetryMissingSearch {
            scheduled_job_id: None,
        }
    }

    #[tokio::test]
    async fn test_listener_mirrors_lifecycle() {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let listener = StoreListener::new(Arc::clone(&store) as Arc<dyn JobStore>);

        listener
            .on_enqueued("b1", &payload(), &EnqueueOptions::default())
            .await;
        listener.on_active("b1", 1).await;
        listener
            .on_completed("b1", &serde_json::json!({"enqueued": 0}))
            .await;

        let job = store.find_by_broker_id("b1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
        assert!(job.result.is_some());
    }

    #[tokio::test]
    async fn test_listener_records_retry_then_failure() {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let listener = StoreListener::new(Arc::clone(&store) as Arc<dyn JobStore>);

        listener
            .on_enqueued("b1", &payload(), &EnqueueOptions::default())
            .await;
        listener.on_active("b1", 1).await;
        listener
            .on_retry_scheduled("b1", "timeout", 1, Duration::from_secs(2))
            .await;

        let job = store.find_by_broker_id("b1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.error_message.as_deref(), Some("timeout"));

        listener.on_active("b1", 2).await;
        listener.on_failed("b1", "timeout", Some("detail")).await;
        let job = store.find_by_broker_id("b1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_detail.as_deref(), Some("detail"));
    }

    #[tokio::test]
    async fn test_listener_tolerates_unknown_ids() {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let listener = StoreListener::new(store as Arc<dyn JobStore>);
        // Must not panic.
        listener.on_active("missing", 1).await;
        listener.on_stalled("missing").await;
    }
}
