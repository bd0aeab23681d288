//! Job processors: the typed handlers that advance the request state machine.

mod cleanup;
mod direct;
mod handoff;
mod library;
mod monitor;
mod notify;
mod organize;
mod refresh;
mod retry;
mod rss;
mod search;
mod shelves;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn, Instrument};

use crate::cache::MetadataCacheStore;
use crate::clients::{ClientError, ClientSet, NotificationKind};
use crate::config::Config;
use crate::direct::DirectDownloadRegistry;
use crate::jobs::{JobPayload, JobStore, JobType};
use crate::metrics;
use crate::queue::{EnqueueOptions, JobHandler, QueueBroker, QueuedJob, WorkerError};
use crate::request::{Audiobook, Request, RequestStatus, RequestStore};
use crate::scheduler::ScheduledJobStore;

pub use cleanup::CleanupSeededTorrentsProcessor;
pub use direct::{MonitorDirectDownloadProcessor, StartDirectDownloadProcessor};
pub use handoff::DownloadTorrentProcessor;
pub use library::{MatchLibraryProcessor, RecentlyAddedCheckProcessor, ScanLibraryProcessor};
pub use monitor::MonitorDownloadProcessor;
pub use notify::SendNotificationProcessor;
pub use organize::OrganizeFilesProcessor;
pub use refresh::RefreshMetadataCacheProcessor;
pub use retry::{RetryFailedImportsProcessor, RetryMissingSearchProcessor};
pub use rss::MonitorRssFeedsProcessor;
pub use search::SearchIndexersProcessor;
pub use shelves::SyncShelvesProcessor;

/// How a processor failed.
///
/// Retryable errors propagate to the broker for backoff retry; terminal
/// errors park the job. Domain outcomes (including domain-level failures
/// that moved a request to `failed` or `warn`) are returned as [`JobOutcome`]
/// instead.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Terminal(String),
}

impl ProcessorError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ProcessorError::Retryable(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        ProcessorError::Terminal(message.into())
    }

    /// Map a client error onto the broker taxonomy.
    pub fn from_client(error: ClientError) -> Self {
        if error.is_retryable() {
            ProcessorError::Retryable(error.to_string())
        } else {
            ProcessorError::Terminal(error.to_string())
        }
    }
}

impl From<crate::request::RequestError> for ProcessorError {
    fn from(error: crate::request::RequestError) -> Self {
        // Store contention is transient by nature.
        ProcessorError::Retryable(error.to_string())
    }
}

impl From<crate::jobs::JobError> for ProcessorError {
    fn from(error: crate::jobs::JobError) -> Self {
        ProcessorError::Retryable(error.to_string())
    }
}

impl From<crate::cache::CacheError> for ProcessorError {
    fn from(error: crate::cache::CacheError) -> Self {
        ProcessorError::Retryable(error.to_string())
    }
}

/// Structured processor result recorded on the Job row.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl JobOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn ok_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            details,
        }
    }

    /// A successful no-op because a prerequisite is not configured.
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: serde_json::json!({ "skipped": true }),
        }
    }

    /// A domain-level failure the processor already recorded on the request.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Everything a processor needs: configuration, stores, the broker for
/// follow-on enqueues, external clients and the direct-download registry.
pub struct ProcessorContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn RequestStore>,
    pub jobs: Arc<dyn JobStore>,
    pub scheduled: Arc<dyn ScheduledJobStore>,
    pub cache: Arc<dyn MetadataCacheStore>,
    pub broker: Arc<dyn QueueBroker>,
    pub clients: ClientSet,
    pub downloads: Arc<DirectDownloadRegistry>,
    pub http: reqwest::Client,
}

impl ProcessorContext {
    /// Enqueue options derived from configuration.
    pub fn default_options(&self) -> EnqueueOptions {
        EnqueueOptions {
            attempts: self.config.queue.default_attempts,
            backoff_initial: Duration::from_millis(self.config.queue.backoff_initial_ms),
            ..Default::default()
        }
    }

    /// Delay between monitor polls.
    pub fn monitor_delay(&self) -> Duration {
        Duration::from_secs(self.config.queue.monitor_poll_secs)
    }

    pub async fn enqueue(&self, payload: JobPayload) -> Result<String, ProcessorError> {
        self.broker
            .enqueue(payload, self.default_options())
            .await
            .map_err(|e| ProcessorError::Retryable(e.to_string()))
    }

    pub async fn enqueue_delayed(
        &self,
        payload: JobPayload,
        delay: Duration,
    ) -> Result<String, ProcessorError> {
        self.broker
            .enqueue(payload, self.default_options().with_delay(delay))
            .await
            .map_err(|e| ProcessorError::Retryable(e.to_string()))
    }

    /// Load a request if (and only if) a processor may act on it in one of
    /// the expected states. Soft-deleted rows, halted automation and state
    /// mismatches all come back as `None`.
    pub fn load_in_state(
        &self,
        request_id: &str,
        expected: &[RequestStatus],
    ) -> Result<Option<Request>, ProcessorError> {
        let Some(request) = self.store.get_request(request_id)? else {
            warn!(request_id, "request vanished, refusing to act");
            return Ok(None);
        };
        if request.deleted_at.is_some() {
            return Ok(None);
        }
        if !expected.contains(&request.status) {
            return Ok(None);
        }
        Ok(Some(request))
    }

    /// Enqueue a best-effort `request_error` notification. Failures are
    /// logged and never mask the primary outcome.
    pub async fn notify_request_error(
        &self,
        request: &Request,
        audiobook: Option<&Audiobook>,
        message: &str,
    ) {
        let payload = serde_json::json!({
            "requestId": request.id,
            "user": request.user_id,
            "title": audiobook.map(|a| a.title.clone()),
            "author": audiobook.map(|a| a.author.clone()),
            "message": message,
        });
        if let Err(e) = self
            .broker
            .enqueue(
                JobPayload::SendNotification {
                    kind: NotificationKind::RequestError,
                    payload,
                },
                self.default_options(),
            )
            .await
        {
            warn!(request_id = %request.id, "failed to enqueue notification: {e}");
        }
    }
}

/// A typed processor for one job type.
#[async_trait]
pub trait Processor: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Worker-pool width for this type.
    fn concurrency(&self) -> usize {
        1
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError>;
}

/// Adapts a [`Processor`] to the broker's [`JobHandler`] contract: runs the
/// typed processor inside a job-tagged span, measures duration, serializes
/// the outcome and maps the error taxonomy.
pub struct ProcessorHandler {
    ctx: Arc<ProcessorContext>,
    processor: Arc<dyn Processor>,
}

impl ProcessorHandler {
    pub fn new(ctx: Arc<ProcessorContext>, processor: Arc<dyn Processor>) -> Self {
        Self { ctx, processor }
    }
}

#[async_trait]
impl JobHandler for ProcessorHandler {
    async fn handle(&self, job: &QueuedJob) -> Result<serde_json::Value, WorkerError> {
        let span = tracing::info_span!(
            "job",
            job_id = %job.broker_id,
            component = %job.job_type,
            attempt = job.attempt,
        );

        async {
            let started = std::time::Instant::now();
            let result = self
                .processor
                .process(job.payload.clone(), &self.ctx, job)
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(outcome) => {
                    metrics::JOB_EXECUTIONS
                        .with_label_values(&[
                            job.job_type.as_str(),
                            if outcome.success { "completed" } else { "completed_with_failure" },
                        ])
                        .inc();
                    info!(elapsed_ms, success = outcome.success, "{}", outcome.message);
                    serde_json::to_value(&outcome)
                        .map_err(|e| WorkerError::Terminal(format!("unserializable outcome: {e}")))
                }
                Err(ProcessorError::Retryable(message)) => {
                    metrics::JOB_EXECUTIONS
                        .with_label_values(&[job.job_type.as_str(), "retryable_error"])
                        .inc();
                    Err(WorkerError::Retryable(message))
                }
                Err(ProcessorError::Terminal(message)) => {
                    metrics::JOB_EXECUTIONS
                        .with_label_values(&[job.job_type.as_str(), "terminal_error"])
                        .inc();
                    Err(WorkerError::Terminal(message))
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Every processor the pipeline ships, in registration order.
pub fn all_processors() -> Vec<Arc<dyn Processor>> {
    vec![
        Arc::new(SearchIndexersProcessor) as Arc<dyn Processor>,
        Arc::new(DownloadTorrentProcessor),
        Arc::new(MonitorDownloadProcessor),
        Arc::new(StartDirectDownloadProcessor),
        Arc::new(MonitorDirectDownloadProcessor),
        Arc::new(OrganizeFilesProcessor),
        Arc::new(ScanLibraryProcessor),
        Arc::new(MatchLibraryProcessor),
        Arc::new(RecentlyAddedCheckProcessor),
        Arc::new(SendNotificationProcessor),
        Arc::new(RetryMissingSearchProcessor),
        Arc::new(RetryFailedImportsProcessor),
        Arc::new(MonitorRssFeedsProcessor),
        Arc::new(CleanupSeededTorrentsProcessor),
        Arc::new(RefreshMetadataCacheProcessor),
        Arc::new(SyncShelvesProcessor),
    ]
}
