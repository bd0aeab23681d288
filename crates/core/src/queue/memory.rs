//! In-process queue broker implementation.
//!
//! A complete realization of the broker contract on the tokio runtime:
//! per-type dispatcher tasks pull from priority heaps, worker pools are
//! bounded by semaphores, delayed jobs promote on their deadline, retryable
//! failures reschedule with exponential backoff, and repeatable entries fire
//! on fixed intervals. Single-process by design; the pipeline assumes one
//! coordinator with at-least-once execution.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::jobs::{JobPayload, JobType};

use super::broker::{JobHandler, NullListener, QueueBroker, QueueListener};
use super::types::{EnqueueOptions, QueueCounts, QueueError, QueuedJob, WorkerError};

const COMPLETED_RETENTION: usize = 100;
const FAILED_RETENTION: usize = 200;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// In-process queue broker.
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    listener: Arc<dyn QueueListener>,
    paused: AtomicBool,
    closed: AtomicBool,
    active_count: AtomicUsize,
    drained: Notify,
    wakers: Mutex<HashMap<JobType, Arc<Notify>>>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<String, JobRecord>,
    queues: HashMap<JobType, TypeQueue>,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    repeatables: HashMap<String, RepeatableEntry>,
    completed_order: VecDeque<String>,
    failed_order: VecDeque<String>,
    seq: u64,
}

struct JobRecord {
    payload: JobPayload,
    priority: i32,
    attempts: u32,
    max_attempts: u32,
    backoff_initial: Duration,
    status: RecordStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordStatus {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

#[derive(Default)]
struct TypeQueue {
    waiting: BinaryHeap<WaitingEntry>,
    delayed: Vec<DelayedEntry>,
}

struct RepeatableEntry {
    every: Duration,
    payload: JobPayload,
    task: JoinHandle<()>,
}

struct WaitingEntry {
    priority: i32,
    seq: u64,
    broker_id: String,
}

impl PartialEq for WaitingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for WaitingEntry {}

impl PartialOrd for WaitingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WaitingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then FIFO within a priority.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct DelayedEntry {
    ready_at: Instant,
    broker_id: String,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create a broker with no lifecycle listener.
    pub fn new() -> Self {
        Self::with_listener(Arc::new(NullListener))
    }

    /// Create a broker that reports lifecycle events to the given listener.
    pub fn with_listener(listener: Arc<dyn QueueListener>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                listener,
                paused: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                active_count: AtomicUsize::new(0),
                drained: Notify::new(),
                wakers: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Inner {
    fn waker(self: &Arc<Self>, job_type: JobType) -> Arc<Notify> {
        let mut wakers = self.wakers.lock().unwrap();
        Arc::clone(wakers.entry(job_type).or_default())
    }

    fn wake_all(self: &Arc<Self>) {
        let wakers = self.wakers.lock().unwrap();
        for waker in wakers.values() {
            waker.notify_one();
        }
    }

    async fn do_enqueue(
        self: &Arc<Self>,
        payload: JobPayload,
        options: EnqueueOptions,
    ) -> Result<String, QueueError> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let broker_id = uuid::Uuid::new_v4().to_string();
        let job_type = payload.job_type();

        // The audit row must exist before a worker can report on it.
        self.listener
            .on_enqueued(&broker_id, &payload, &options)
            .await;

        {
            let mut state = self.state.lock().unwrap();
            state.seq += 1;
            let seq = state.seq;

            let status = if options.delay.is_some() {
                RecordStatus::Delayed
            } else {
                RecordStatus::Waiting
            };

            state.jobs.insert(
                broker_id.clone(),
                JobRecord {
                    payload,
                    priority: options.priority,
                    attempts: 0,
                    max_attempts: options.attempts.max(1),
                    backoff_initial: options.backoff_initial,
                    status,
                },
            );

            let queue = state.queues.entry(job_type).or_default();
            match options.delay {
                Some(delay) => queue.delayed.push(DelayedEntry {
                    ready_at: Instant::now() + delay,
                    broker_id: broker_id.clone(),
                }),
                None => queue.waiting.push(WaitingEntry {
                    priority: options.priority,
                    seq,
                    broker_id: broker_id.clone(),
                }),
            }
        }

        self.waker(job_type).notify_one();
        debug!(job_type = %job_type, broker_id = %broker_id, "job enqueued");
        Ok(broker_id)
    }

    /// Promote due delayed jobs and pop the best waiting job for a type.
    /// Returns the popped broker id and the next delayed deadline, if any.
    fn next_ready(self: &Arc<Self>, job_type: JobType) -> (Option<String>, Option<Instant>) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let now = Instant::now();

        let mut promotions = Vec::new();
        if let Some(queue) = state.queues.get_mut(&job_type) {
            let mut idx = 0;
            while idx < queue.delayed.len() {
                if queue.delayed[idx].ready_at <= now {
                    promotions.push(queue.delayed.swap_remove(idx).broker_id);
                } else {
                    idx += 1;
                }
            }
        }
        for broker_id in promotions {
            state.seq += 1;
            let seq = state.seq;
            let Some(record) = state.jobs.get_mut(&broker_id) else {
                continue;
            };
            record.status = RecordStatus::Waiting;
            let priority = record.priority;
            state
                .queues
                .entry(job_type)
                .or_default()
                .waiting
                .push(WaitingEntry {
                    priority,
                    seq,
                    broker_id,
                });
        }

        let queue = state.queues.entry(job_type).or_default();
        let mut popped = None;
        while let Some(entry) = queue.waiting.pop() {
            // Skip stale entries whose record was removed or re-queued.
            let runnable = matches!(
                state.jobs.get(&entry.broker_id).map(|r| r.status),
                Some(RecordStatus::Waiting)
            );
            if runnable {
                popped = Some(entry.broker_id);
                break;
            }
        }

        let next_deadline = state
            .queues
            .get(&job_type)
            .and_then(|q| q.delayed.iter().map(|d| d.ready_at).min());

        (popped, next_deadline)
    }

    fn spawn_dispatcher(self: &Arc<Self>, job_type: JobType, semaphore: Arc<Semaphore>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            debug!(job_type = %job_type, "dispatcher started");
            let waker = inner.waker(job_type);
            loop {
                if inner.closed.load(AtomicOrdering::SeqCst) {
                    break;
                }
                if inner.paused.load(AtomicOrdering::SeqCst) {
                    waker.notified().await;
                    continue;
                }

                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };

                let (job, next_deadline) = inner.next_ready(job_type);
                match job {
                    Some(broker_id) => {
                        inner.spawn_worker(job_type, broker_id, permit);
                    }
                    None => {
                        drop(permit);
                        let sleep_for = next_deadline
                            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                            .unwrap_or(Duration::from_millis(500));
                        tokio::select! {
                            _ = waker.notified() => {}
                            _ = tokio::time::sleep(sleep_for) => {}
                        }
                    }
                }
            }
            debug!(job_type = %job_type, "dispatcher stopped");
        });
    }

    fn spawn_worker(
        self: &Arc<Self>,
        job_type: JobType,
        broker_id: String,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let inner = Arc::clone(self);
        self.active_count.fetch_add(1, AtomicOrdering::SeqCst);

        tokio::spawn(async move {
            let _permit = permit;

            let (queued, handler) = {
                let mut state = inner.state.lock().unwrap();
                let Some(record) = state.jobs.get_mut(&broker_id) else {
                    inner.finish_worker(job_type);
                    return;
                };
                record.attempts += 1;
                record.status = RecordStatus::Active;
                let queued = QueuedJob {
                    broker_id: broker_id.clone(),
                    job_type,
                    payload: record.payload.clone(),
                    priority: record.priority,
                    attempt: record.attempts,
                    max_attempts: record.max_attempts,
                };
                let handler = state.handlers.get(&job_type).cloned();
                (queued, handler)
            };

            let Some(handler) = handler else {
                inner.finish_worker(job_type);
                return;
            };

            inner.listener.on_active(&broker_id, queued.attempt).await;

            let outcome = std::panic::AssertUnwindSafe(handler.handle(&queued))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(result)) => {
                    inner.record_completed(&broker_id);
                    inner.listener.on_completed(&broker_id, &result).await;
                }
                Ok(Err(WorkerError::Retryable(message))) if queued.attempt < queued.max_attempts => {
                    let delay = inner.schedule_retry(job_type, &broker_id, queued.attempt);
                    inner
                        .listener
                        .on_retry_scheduled(&broker_id, &message, queued.attempt, delay)
                        .await;
                    warn!(
                        broker_id = %broker_id,
                        attempt = queued.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable failure, rescheduled: {message}"
                    );
                }
                Ok(Err(error)) => {
                    let message = error.to_string();
                    inner.record_failed(&broker_id);
                    inner.listener.on_failed(&broker_id, &message, None).await;
                    warn!(broker_id = %broker_id, "job failed: {message}");
                }
                Err(_) => {
                    // The handler panicked: report a stall, then consume an
                    // attempt like any other failure.
                    inner.listener.on_stalled(&broker_id).await;
                    if queued.attempt < queued.max_attempts {
                        let delay = inner.schedule_retry(job_type, &broker_id, queued.attempt);
                        inner
                            .listener
                            .on_retry_scheduled(
                                &broker_id,
                                "worker task panicked",
                                queued.attempt,
                                delay,
                            )
                            .await;
                    } else {
                        inner.record_failed(&broker_id);
                        inner
                            .listener
                            .on_failed(&broker_id, "worker task panicked", None)
                            .await;
                    }
                    warn!(broker_id = %broker_id, "worker task panicked");
                }
            }

            inner.finish_worker(job_type);
        });
    }

    fn finish_worker(self: &Arc<Self>, job_type: JobType) {
        self.active_count.fetch_sub(1, AtomicOrdering::SeqCst);
        self.drained.notify_waiters();
        self.waker(job_type).notify_one();
    }

    fn record_completed(self: &Arc<Self>, broker_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.jobs.get_mut(broker_id) {
            record.status = RecordStatus::Completed;
        }
        state.completed_order.push_back(broker_id.to_string());
        while state.completed_order.len() > COMPLETED_RETENTION {
            if let Some(old) = state.completed_order.pop_front() {
                state.jobs.remove(&old);
            }
        }
    }

    fn record_failed(self: &Arc<Self>, broker_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.jobs.get_mut(broker_id) {
            record.status = RecordStatus::Failed;
        }
        state.failed_order.push_back(broker_id.to_string());
        while state.failed_order.len() > FAILED_RETENTION {
            if let Some(old) = state.failed_order.pop_front() {
                state.jobs.remove(&old);
            }
        }
    }

    /// Exponential backoff: initial * 2^(attempt - 1).
    fn schedule_retry(self: &Arc<Self>, job_type: JobType, broker_id: &str, attempt: u32) -> Duration {
        let mut state = self.state.lock().unwrap();
        let delay = state
            .jobs
            .get(broker_id)
            .map(|r| r.backoff_initial * 2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(Duration::from_secs(2));

        if let Some(record) = state.jobs.get_mut(broker_id) {
            record.status = RecordStatus::Delayed;
        }
        state
            .queues
            .entry(job_type)
            .or_default()
            .delayed
            .push(DelayedEntry {
                ready_at: Instant::now() + delay,
                broker_id: broker_id.to_string(),
            });
        drop(state);

        self.waker(job_type).notify_one();
        delay
    }
}

#[async_trait]
impl QueueBroker for MemoryBroker {
    async fn enqueue(
        &self,
        payload: JobPayload,
        options: EnqueueOptions,
    ) -> Result<String, QueueError> {
        self.inner.do_enqueue(payload, options).await
    }

    async fn register_repeatable(
        &self,
        key: &str,
        payload: JobPayload,
        every: Duration,
    ) -> Result<(), QueueError> {
        if self.inner.closed.load(AtomicOrdering::SeqCst) {
            return Err(QueueError::Closed);
        }

        {
            let state = self.inner.state.lock().unwrap();
            if let Some(existing) = state.repeatables.get(key) {
                if existing.every == every && existing.payload == payload {
                    return Ok(());
                }
            }
        }

        let inner = Arc::clone(&self.inner);
        let task_key = key.to_string();
        let task_payload = payload.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                if inner.closed.load(AtomicOrdering::SeqCst) {
                    break;
                }
                if inner.paused.load(AtomicOrdering::SeqCst) {
                    continue;
                }
                match inner
                    .do_enqueue(task_payload.clone(), EnqueueOptions::default())
                    .await
                {
                    Ok(broker_id) => {
                        inner
                            .listener
                            .on_repeatable_fired(&task_key, &broker_id)
                            .await;
                    }
                    Err(QueueError::Closed) => break,
                    Err(e) => warn!(key = %task_key, "repeatable enqueue failed: {e}"),
                }
            }
        });

        let mut state = self.inner.state.lock().unwrap();
        if let Some(replaced) = state.repeatables.insert(
            key.to_string(),
            RepeatableEntry {
                every,
                payload,
                task,
            },
        ) {
            replaced.task.abort();
        }
        info!(key = %key, every_secs = every.as_secs(), "repeatable registered");
        Ok(())
    }

    async fn unregister_repeatable(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.inner.state.lock().unwrap();
            state.repeatables.remove(key)
        };
        match removed {
            Some(entry) => {
                entry.task.abort();
                info!(key = %key, "repeatable unregistered");
                true
            }
            None => false,
        }
    }

    async fn set_processor(
        &self,
        job_type: JobType,
        concurrency: usize,
        handler: Arc<dyn JobHandler>,
    ) {
        let first_registration = {
            let mut state = self.inner.state.lock().unwrap();
            state.handlers.insert(job_type, handler).is_none()
        };

        // One dispatcher per type; re-registration only swaps the handler.
        if first_registration {
            let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
            self.inner.spawn_dispatcher(job_type, semaphore);
        }
    }

    async fn get_job(&self, broker_id: &str) -> Option<QueuedJob> {
        let state = self.inner.state.lock().unwrap();
        state.jobs.get(broker_id).map(|record| QueuedJob {
            broker_id: broker_id.to_string(),
            job_type: record.payload.job_type(),
            payload: record.payload.clone(),
            priority: record.priority,
            attempt: record.attempts,
            max_attempts: record.max_attempts,
        })
    }

    async fn retry(&self, broker_id: &str) -> Result<(), QueueError> {
        let job_type = {
            let mut state = self.inner.state.lock().unwrap();
            let Some(record) = state.jobs.get_mut(broker_id) else {
                return Err(QueueError::NotFound(broker_id.to_string()));
            };
            if record.status != RecordStatus::Failed {
                return Err(QueueError::NotRetryable(broker_id.to_string()));
            }
            record.status = RecordStatus::Waiting;
            record.attempts = 0;
            let job_type = record.payload.job_type();
            let priority = record.priority;

            state.failed_order.retain(|id| id != broker_id);
            state.seq += 1;
            let seq = state.seq;
            state
                .queues
                .entry(job_type)
                .or_default()
                .waiting
                .push(WaitingEntry {
                    priority,
                    seq,
                    broker_id: broker_id.to_string(),
                });
            job_type
        };

        self.inner.waker(job_type).notify_one();
        Ok(())
    }

    async fn remove(&self, broker_id: &str) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        match state.jobs.get(broker_id).map(|r| r.status) {
            Some(RecordStatus::Waiting) | Some(RecordStatus::Delayed) => {
                state.jobs.remove(broker_id);
                for queue in state.queues.values_mut() {
                    queue.delayed.retain(|d| d.broker_id != broker_id);
                }
                true
            }
            _ => false,
        }
    }

    async fn pause(&self) {
        self.inner.paused.store(true, AtomicOrdering::SeqCst);
        info!("queue paused");
    }

    async fn resume(&self) {
        self.inner.paused.store(false, AtomicOrdering::SeqCst);
        self.inner.wake_all();
        info!("queue resumed");
    }

    async fn counts(&self) -> QueueCounts {
        let state = self.inner.state.lock().unwrap();
        let mut counts = QueueCounts::default();
        for record in state.jobs.values() {
            match record.status {
                RecordStatus::Waiting => counts.waiting += 1,
                RecordStatus::Delayed => counts.delayed += 1,
                RecordStatus::Active => counts.active += 1,
                RecordStatus::Completed => counts.completed += 1,
                RecordStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    async fn close(&self) {
        if self.inner.closed.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        info!("closing queue broker");

        let repeatables = {
            let mut state = self.inner.state.lock().unwrap();
            std::mem::take(&mut state.repeatables)
        };
        for entry in repeatables.into_values() {
            entry.task.abort();
        }

        self.inner.wake_all();

        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.inner.active_count.load(AtomicOrdering::SeqCst) > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("queue close timed out with active jobs");
                break;
            }
            let _ = tokio::time::timeout(remaining, self.inner.drained.notified()).await;
        }
        info!("queue broker closed");
    }
}
