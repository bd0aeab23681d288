//! Queue broker contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::jobs::{JobPayload, JobType};

use super::types::{EnqueueOptions, QueueCounts, QueueError, QueuedJob, WorkerError};

/// Typed handler invoked by the broker for one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one job. The returned value is recorded as the job result.
    async fn handle(&self, job: &QueuedJob) -> Result<serde_json::Value, WorkerError>;
}

/// Lifecycle events emitted by the broker.
///
/// Each event maps to a Job Store patch; implementations must tolerate
/// unknown broker ids (at-least-once delivery makes duplicates possible).
#[async_trait]
pub trait QueueListener: Send + Sync {
    /// A job entered the queue (also fired for repeatable ticks).
    async fn on_enqueued(&self, broker_id: &str, payload: &JobPayload, options: &EnqueueOptions);

    /// A worker picked the job up for the given attempt (1-based).
    async fn on_active(&self, broker_id: &str, attempt: u32);

    /// The handler returned a result.
    async fn on_completed(&self, broker_id: &str, result: &serde_json::Value);

    /// A retryable failure with attempts remaining; the broker rescheduled.
    async fn on_retry_scheduled(&self, broker_id: &str, error: &str, attempt: u32, delay: Duration);

    /// The job parked as failed (terminal error or attempts exhausted).
    async fn on_failed(&self, broker_id: &str, error: &str, detail: Option<&str>);

    /// The worker task died without reporting an outcome.
    async fn on_stalled(&self, broker_id: &str);

    /// A repeatable entry fired and enqueued the given job.
    async fn on_repeatable_fired(&self, key: &str, broker_id: &str);
}

/// A listener that ignores every event; the default when no audit surface is
/// attached.
pub struct NullListener;

#[async_trait]
impl QueueListener for NullListener {
    async fn on_enqueued(&self, _: &str, _: &JobPayload, _: &EnqueueOptions) {}
    async fn on_active(&self, _: &str, _: u32) {}
    async fn on_completed(&self, _: &str, _: &serde_json::Value) {}
    async fn on_retry_scheduled(&self, _: &str, _: &str, _: u32, _: Duration) {}
    async fn on_failed(&self, _: &str, _: &str, _: Option<&str>) {}
    async fn on_stalled(&self, _: &str) {}
    async fn on_repeatable_fired(&self, _: &str, _: &str) {}
}

/// The queue broker contract.
///
/// Provides push with priority/delay, repeatable registration, per-type
/// worker pools with bounded concurrency, retry with exponential backoff and
/// lifecycle events.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Enqueue one job; returns the broker-side id.
    async fn enqueue(
        &self,
        payload: JobPayload,
        options: EnqueueOptions,
    ) -> Result<String, QueueError>;

    /// Register (or idempotently re-register) a repeatable entry.
    async fn register_repeatable(
        &self,
        key: &str,
        payload: JobPayload,
        every: Duration,
    ) -> Result<(), QueueError>;

    /// Remove a repeatable entry; returns whether it existed.
    async fn unregister_repeatable(&self, key: &str) -> bool;

    /// Install the handler and worker pool for a job type.
    async fn set_processor(&self, job_type: JobType, concurrency: usize, handler: Arc<dyn JobHandler>);

    /// Broker-side snapshot of a job.
    async fn get_job(&self, broker_id: &str) -> Option<QueuedJob>;

    /// Re-run a parked failed job from scratch.
    async fn retry(&self, broker_id: &str) -> Result<(), QueueError>;

    /// Drop a job that has not started; returns whether it was removed.
    async fn remove(&self, broker_id: &str) -> bool;

    /// Stop dispatching new work (running jobs finish).
    async fn pause(&self);

    /// Resume dispatching.
    async fn resume(&self);

    /// Aggregate counters.
    async fn counts(&self) -> QueueCounts;

    /// Graceful shutdown: stop dispatchers, cancel repeatables, drain active
    /// work.
    async fn close(&self);
}
