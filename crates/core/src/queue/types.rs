//! Types for the queue broker contract.

use std::time::Duration;

use thiserror::Error;

use crate::jobs::{JobPayload, JobType};

/// Errors surfaced by the queue broker.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Broker is closed")]
    Closed,

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job is not in a retryable state: {0}")]
    NotRetryable(String),
}

/// How a handler signals failure to the broker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Transient failure; the broker reschedules with backoff while attempts
    /// remain.
    #[error("{0}")]
    Retryable(String),

    /// Unrecoverable failure; the job parks as failed immediately.
    #[error("{0}")]
    Terminal(String),
}

impl WorkerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        WorkerError::Retryable(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        WorkerError::Terminal(message.into())
    }
}

/// Options for enqueueing one job.
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Higher runs first within a type.
    pub priority: i32,
    /// Hold the job back before it becomes runnable.
    pub delay: Option<Duration>,
    /// Total attempts before the job parks as failed.
    pub attempts: u32,
    /// Initial exponential-backoff delay between attempts.
    pub backoff_initial: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay: None,
            attempts: 3,
            backoff_initial: Duration::from_millis(2000),
        }
    }
}

impl EnqueueOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }
}

/// Broker-side snapshot of one job, handed to handlers.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub broker_id: String,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub priority: i32,
    /// Attempt number of the current run (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Aggregate queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}
