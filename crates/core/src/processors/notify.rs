//! Notification processor: best-effort publication to the bus.

use async_trait::async_trait;
use tracing::warn;

use crate::jobs::{JobPayload, JobType};
use crate::queue::QueuedJob;

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Publishes one notification. Failures are logged, never retried: a dead
/// bus must not hold the pipeline hostage.
pub struct SendNotificationProcessor;

#[async_trait]
impl Processor for SendNotificationProcessor {
    fn job_type(&self) -> JobType {
        JobType::SendNotification
    }

    fn concurrency(&self) -> usize {
        2
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::SendNotification { kind, payload } = payload else {
            return Err(ProcessorError::terminal("wrong payload for notify processor"));
        };

        let Some(notifier) = ctx.clients.notifier.clone() else {
            return Ok(JobOutcome::skipped("notification bus not configured"));
        };

        match notifier.publish(kind, payload).await {
            Ok(()) => Ok(JobOutcome::ok(format!("{} notification published", kind.as_str()))),
            Err(e) => {
                warn!(kind = kind.as_str(), "notification publish failed: {e}");
                Ok(JobOutcome::ok_with(
                    "notification publish failed",
                    serde_json::json!({ "error": e.to_string() }),
                ))
            }
        }
    }
}
