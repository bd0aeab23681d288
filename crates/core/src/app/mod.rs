//! Application composition root.
//!
//! Owns the stores, broker, processors and scheduler, wires them together at
//! startup and closes them in reverse dependency order on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{CacheError, MetadataCacheStore, SqliteMetadataCache};
use crate::clients::ClientSet;
use crate::config::Config;
use crate::direct::DirectDownloadRegistry;
use crate::jobs::{JobError, JobPatch, JobPayload, JobStore, SqliteJobStore, StoreListener};
use crate::processors::{all_processors, ProcessorContext, ProcessorHandler};
use crate::queue::{MemoryBroker, QueueBroker, QueueError};
use crate::request::{
    NewAudiobook, NewRequest, Request, RequestError, RequestStatus, RequestStore,
    RequestType, SqliteRequestStore,
};
use crate::scheduler::{ScheduleError, ScheduledJobStore, Scheduler, SchedulerError, SqliteScheduledJobStore};

/// Errors surfaced while wiring or driving the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Jobs(#[from] JobError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// The assembled pipeline.
pub struct App {
    ctx: Arc<ProcessorContext>,
    scheduler: Scheduler,
    broker: Arc<dyn QueueBroker>,
    running: AtomicBool,
}

impl App {
    /// Assemble an application from explicit parts (tests wire mocks here).
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RequestStore>,
        jobs: Arc<dyn JobStore>,
        scheduled: Arc<dyn ScheduledJobStore>,
        cache: Arc<dyn MetadataCacheStore>,
        clients: ClientSet,
    ) -> Self {
        let listener = StoreListener::new(Arc::clone(&jobs))
            .with_scheduled_store(Arc::clone(&scheduled));
        let broker: Arc<dyn QueueBroker> =
            Arc::new(MemoryBroker::with_listener(Arc::new(listener)));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let ctx = Arc::new(ProcessorContext {
            config,
            store,
            jobs,
            scheduled: Arc::clone(&scheduled),
            cache,
            broker: Arc::clone(&broker),
            clients,
            downloads: Arc::new(DirectDownloadRegistry::new()),
            http,
        });

        let scheduler = Scheduler::new(scheduled, Arc::clone(&broker));

        Self {
            ctx,
            scheduler,
            broker,
            running: AtomicBool::new(false),
        }
    }

    /// Assemble an application with SQLite stores at the configured path.
    pub fn open(config: Config, clients: ClientSet) -> Result<Self, AppError> {
        let db_path = config.database.path.clone();
        let store: Arc<dyn RequestStore> = Arc::new(SqliteRequestStore::new(&db_path)?);
        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(&db_path)?);
        let scheduled: Arc<dyn ScheduledJobStore> =
            Arc::new(SqliteScheduledJobStore::new(&db_path)?);
        let cache: Arc<dyn MetadataCacheStore> = Arc::new(SqliteMetadataCache::new(&db_path)?);

        Ok(Self::new(
            Arc::new(config),
            store,
            jobs,
            scheduled,
            cache,
            clients,
        ))
    }

    /// Register every processor with its worker pool, then start the
    /// scheduler (seeding, repeatables, overdue triggers).
    pub async fn start(&self) -> Result<(), AppError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("application already running");
            return Ok(());
        }
        info!("starting pipeline");

        for processor in all_processors() {
            let handler = Arc::new(ProcessorHandler::new(
                Arc::clone(&self.ctx),
                Arc::clone(&processor),
            ));
            self.broker
                .set_processor(processor.job_type(), processor.concurrency(), handler)
                .await;
        }

        self.scheduler.start().await?;
        info!("pipeline started");
        Ok(())
    }

    /// Graceful shutdown: the broker drains before anything else lets go.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping pipeline");
        self.broker.close().await;
        info!("pipeline stopped");
    }

    pub fn context(&self) -> Arc<ProcessorContext> {
        Arc::clone(&self.ctx)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn broker(&self) -> Arc<dyn QueueBroker> {
        Arc::clone(&self.broker)
    }

    /// Create a request for a title and enqueue its first search.
    pub async fn submit_request(
        &self,
        user_id: &str,
        request_type: RequestType,
        audiobook: NewAudiobook,
    ) -> Result<Request, AppError> {
        let title = audiobook.title.clone();
        let author = audiobook.author.clone();
        let asin = audiobook.asin.clone();

        let audiobook = self.ctx.store.create_audiobook(audiobook)?;
        let request = self.ctx.store.create_request(NewRequest {
            user_id: user_id.to_string(),
            request_type,
            audiobook_id: audiobook.id.clone(),
            max_import_retries: None,
        })?;

        self.broker
            .enqueue(
                JobPayload::SearchIndexers {
                    request_id: request.id.clone(),
                    audiobook: crate::jobs::AudiobookRef {
                        id: audiobook.id,
                        title,
                        author,
                        asin,
                    },
                },
                self.ctx.default_options(),
            )
            .await?;

        info!(request_id = %request.id, "request submitted");
        Ok(request)
    }

    /// Cancel a request from any non-terminal state.
    pub fn cancel_request(&self, request_id: &str) -> Result<Option<Request>, AppError> {
        let cancellable = [
            RequestStatus::AwaitingSearch,
            RequestStatus::AwaitingDownload,
            RequestStatus::Downloading,
            RequestStatus::AwaitingImport,
            RequestStatus::Processing,
            RequestStatus::Downloaded,
            RequestStatus::Warn,
        ];
        let cancelled = self
            .ctx
            .store
            .transition(request_id, &cancellable, RequestStatus::Cancelled)?;
        if cancelled.is_some() {
            crate::metrics::REQUEST_OUTCOMES
                .with_label_values(&["cancelled"])
                .inc();
        }
        Ok(cancelled)
    }

    /// Re-run a parked failed job: reset the audit row, then requeue.
    pub async fn retry_job(&self, broker_id: &str) -> Result<(), AppError> {
        self.ctx.jobs.update_by_broker_id(broker_id, &JobPatch::retried())?;
        self.broker.retry(broker_id).await?;
        Ok(())
    }
}
