//! Recurring retry processors for stuck requests.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::clients::DownloadHandle;
use crate::jobs::{AudiobookRef, JobPayload, JobType};
use crate::pathmap;
use crate::queue::QueuedJob;
use crate::request::{DownloadHistory, RequestFilter, RequestStatus};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Window size for both retry sweeps.
const RETRY_WINDOW: i64 = 50;

/// Re-enqueues a search for every request still waiting on one.
pub struct RetryMissingSearchProcessor;

#[async_trait]
impl Processor for RetryMissingSearchProcessor {
    fn job_type(&self) -> JobType {
        JobType::RetryMissingSearch
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::RetryMissingSearch { .. } = payload else {
            return Err(ProcessorError::terminal("wrong payload for retry-search processor"));
        };

        let filter = RequestFilter::new()
            .with_status(RequestStatus::AwaitingSearch)
            .with_limit(RETRY_WINDOW);
        let requests = ctx.store.list_requests(&filter)?;

        let mut enqueued = 0usize;
        let mut skipped = 0usize;
        let spacing = Duration::from_millis(ctx.config.queue.enqueue_spacing_ms);

        for request in &requests {
            let Some(audiobook) = ctx.store.get_audiobook(&request.audiobook_id)? else {
                skipped += 1;
                continue;
            };

            ctx.enqueue(JobPayload::SearchIndexers {
                request_id: request.id.clone(),
                audiobook: AudiobookRef {
                    id: audiobook.id.clone(),
                    title: audiobook.title.clone(),
                    author: audiobook.author.clone(),
                    asin: audiobook.asin.clone(),
                },
            })
            .await?;
            enqueued += 1;

            // Spacing keeps a 50-row sweep from stampeding the pool.
            tokio::time::sleep(spacing).await;
        }

        info!(enqueued, skipped, "missing-search sweep finished");
        Ok(JobOutcome::ok_with(
            "missing-search sweep finished",
            serde_json::json!({ "enqueued": enqueued, "skipped": skipped }),
        ))
    }
}

/// Re-enqueues the organizer for requests stuck awaiting import, resolving a
/// usable download path first.
pub struct RetryFailedImportsProcessor;

#[async_trait]
impl Processor for RetryFailedImportsProcessor {
    fn job_type(&self) -> JobType {
        JobType::RetryFailedImports
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::RetryFailedImports { .. } = payload else {
            return Err(ProcessorError::terminal("wrong payload for retry-import processor"));
        };

        let filter = RequestFilter::new()
            .with_status(RequestStatus::AwaitingImport)
            .with_limit(RETRY_WINDOW);
        let requests = ctx.store.list_requests(&filter)?;

        let mut enqueued = 0usize;
        let mut skipped = 0usize;
        let spacing = Duration::from_millis(ctx.config.queue.enqueue_spacing_ms);

        for request in &requests {
            let Some(history) = ctx.store.latest_selected_history(&request.id)? else {
                skipped += 1;
                continue;
            };

            let Some(download_path) = self.resolve_path(ctx, &history).await else {
                debug!(request_id = %request.id, "no download path resolvable, skipping");
                skipped += 1;
                continue;
            };

            ctx.enqueue(JobPayload::OrganizeFiles {
                request_id: request.id.clone(),
                audiobook_id: request.audiobook_id.clone(),
                download_path,
            })
            .await?;
            enqueued += 1;

            tokio::time::sleep(spacing).await;
        }

        info!(enqueued, skipped, "failed-import sweep finished");
        Ok(JobOutcome::ok_with(
            "failed-import sweep finished",
            serde_json::json!({ "enqueued": enqueued, "skipped": skipped }),
        ))
    }
}

impl RetryFailedImportsProcessor {
    /// Path resolution priority:
    /// 1. the stored path captured at completion time,
    /// 2. a live client lookup, mapped to the local view,
    /// 3. download_dir/custom_path/torrent_name, mapped likewise.
    async fn resolve_path(
        &self,
        ctx: &ProcessorContext,
        history: &DownloadHistory,
    ) -> Option<String> {
        if let Some(path) = &history.download_path {
            if !path.is_empty() {
                return Some(path.clone());
            }
        }

        let mapping = ctx.config.mapping_for(history.download_client);

        if let Some(client) = ctx.clients.download_client(history.download_client) {
            if let Some(client_id) = &history.download_client_id {
                let handle = DownloadHandle {
                    client_id: client_id.clone(),
                    torrent_hash: history.torrent_hash.clone(),
                    nzb_id: history.nzb_id.clone(),
                };
                if let Ok(Some(snapshot)) = client.get_download(&handle).await {
                    if let Some(path) = snapshot.download_path {
                        return Some(match mapping {
                            Some(m) => pathmap::transform(&path, &m.mapping),
                            None => path,
                        });
                    }
                }
            }
        }

        let name = history.torrent_name.as_deref()?;
        let composed = pathmap::compose(
            &ctx.config.paths.download_dir,
            mapping.and_then(|m| m.custom_path.as_deref()),
            name,
        );
        let composed = composed.to_string_lossy().into_owned();
        Some(match mapping {
            Some(m) => pathmap::transform(&composed, &m.mapping),
            None => composed,
        })
    }
}
