//! Direct download processors for e-book sidecars.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::direct::stream_to_file;
use crate::jobs::{JobPayload, JobType};
use crate::organizer::sanitize_component;
use crate::queue::QueuedJob;
use crate::request::{DownloadStatus, Request, RequestStatus};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Iterates the candidate mirrors, streaming the first that resolves.
pub struct StartDirectDownloadProcessor;

#[async_trait]
impl Processor for StartDirectDownloadProcessor {
    fn job_type(&self) -> JobType {
        JobType::StartDirectDownload
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
        let JobPayload::StartDirectDownload {
            request_id,
            download_history_id,
            mirror_urls,
            target_filename,
            expected_size,
        } = payload
        else {
            return Err(ProcessorError::terminal(
                "wrong payload for direct download processor",
            ));
        };

        let Some(request) = ctx.load_in_state(
            &request_id,
            &[RequestStatus::AwaitingDownload, RequestStatus::Downloading],
        )?
        else {
            return Ok(JobOutcome::ok("request is not awaiting download, nothing to do"));
        };

        let Some(scraper) = ctx.clients.scraper.clone() else {
            return Ok(JobOutcome::skipped("e-book scraper not configured"));
        };

        if request.status == RequestStatus::AwaitingDownload
            && ctx
                .store
                .transition(
                    &request_id,
                    &[RequestStatus::AwaitingDownload],
                    RequestStatus::Downloading,
                )?
                .is_none()
        {
            return Ok(JobOutcome::ok("request changed state before download start"));
        }
        ctx.store
            .update_history_status(download_history_id, DownloadStatus::Downloading, None)?;

        let download_id = uuid::Uuid::new_v4().to_string();
        let state = ctx.downloads.begin(&download_id).await;
        if let Some(size) = expected_size {
            state.set_total(size);
        }

        let dest = ctx
            .config
            .paths
            .download_dir
            .join(sanitize_component(&target_filename));

        ctx.enqueue_delayed(
            JobPayload::MonitorDirectDownload {
                request_id: request_id.clone(),
                download_history_id,
                download_id: download_id.clone(),
                target_path: dest.to_string_lossy().into_owned(),
                expected_size,
            },
            ctx.monitor_delay(),
        )
        .await?;

        let mirrors: Vec<&String> = mirror_urls
            .iter()
            .take(ctx.config.ebook.mirror_limit)
            .collect();
        let total_mirrors = mirrors.len();

        for (index, mirror) in mirrors.into_iter().enumerate() {
            let resolved = match scraper
                .extract_download_url(mirror, &ctx.config.ebook.preferred_format)
                .await
            {
                Ok(Some(resolved)) => resolved,
                Ok(None) => {
                    warn!(request_id = %request_id, mirror = %mirror, "mirror did not resolve to a file URL");
                    continue;
                }
                Err(e) => {
                    warn!(request_id = %request_id, mirror = %mirror, "mirror extraction failed: {e}");
                    continue;
                }
            };

            // Progress flushes are debounced to a single in-flight DB write.
            let pending = Arc::new(AtomicBool::new(false));
            let store = Arc::clone(&ctx.store);
            let progress_request = request_id.clone();
            let progress_state = Arc::clone(&state);
            let on_progress = move |_bytes: u64, _total: u64| {
                if pending.swap(true, Ordering::SeqCst) {
                    return;
                }
                let store = Arc::clone(&store);
                let request_id = progress_request.clone();
                let pending = Arc::clone(&pending);
                let percent = progress_state.snapshot().percent();
                tokio::spawn(async move {
                    if let Err(e) = store.set_progress(&request_id, percent) {
                        warn!(request_id = %request_id, "failed to flush direct progress: {e}");
                    }
                    pending.store(false, Ordering::SeqCst);
                });
            };

            match stream_to_file(&ctx.http, &resolved.url, &dest, &state, on_progress).await {
                Ok(bytes) => {
                    state.mark_completed();
                    return self
                        .finish_success(ctx, &request, download_history_id, &dest, bytes, index)
                        .await;
                }
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        mirror_index = index,
                        "mirror download failed: {e}"
                    );
                }
            }
        }

        // Every mirror failed.
        state.mark_failed();
        let message = format!("all {total_mirrors} download mirrors failed");
        ctx.store
            .update_history_status(download_history_id, DownloadStatus::Failed, Some(&message))?;
        ctx.store.set_error_message(&request_id, Some(&message))?;
        ctx.store.transition(
            &request_id,
            &[RequestStatus::Downloading],
            RequestStatus::Failed,
        )?;
        crate::metrics::REQUEST_OUTCOMES
            .with_label_values(&["failed"])
            .inc();
        let audiobook = ctx.store.get_audiobook(&request.audiobook_id)?;
        ctx.notify_request_error(&request, audiobook.as_ref(), &message)
            .await;
        Ok(JobOutcome::failed(message))
    }
}

impl StartDirectDownloadProcessor {
    async fn finish_success(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        download_history_id: i64,
        dest: &std::path::Path,
        bytes: u64,
        mirror_index: usize,
    ) -> Result<JobOutcome, ProcessorError> {
        let path = dest.to_string_lossy().into_owned();
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        ctx.store
            .set_history_download_path(download_history_id, &path, name.as_deref())?;
        ctx.store
            .update_history_status(download_history_id, DownloadStatus::Completed, None)?;

        if ctx
            .store
            .transition(
                &request.id,
                &[RequestStatus::Downloading],
                RequestStatus::AwaitingImport,
            )?
            .is_none()
        {
            return Ok(JobOutcome::ok("request changed state during direct download"));
        }

        info!(request_id = %request.id, bytes, mirror_index, "direct download complete");

        ctx.enqueue(JobPayload::OrganizeFiles {
            request_id: request.id.clone(),
            audiobook_id: request.audiobook_id.clone(),
            download_path: path.clone(),
        })
        .await?;

        Ok(JobOutcome::ok_with(
            "direct download complete, import enqueued",
            serde_json::json!({ "bytes": bytes, "mirror": mirror_index, "path": path }),
        ))
    }
}

/// Publishes registry progress while a direct download streams.
pub struct MonitorDirectDownloadProcessor;

#[async_trait]
impl Processor for MonitorDirectDownloadProcessor {
    fn job_type(&self) -> JobType {
        JobType::MonitorDirectDownload
    }

    fn concurrency(&self) -> usize {
        5
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::MonitorDirectDownload {
            request_id,
            download_id,
            ..
        } = payload.clone()
        else {
            return Err(ProcessorError::terminal(
                "wrong payload for direct monitor processor",
            ));
        };

        let Some(snapshot) = ctx.downloads.snapshot(&download_id).await else {
            return Ok(JobOutcome::ok("direct download no longer tracked"));
        };

        if snapshot.completed || snapshot.failed {
            ctx.downloads.remove(&download_id).await;
            return Ok(JobOutcome::ok_with(
                "direct download finished",
                serde_json::json!({ "completed": snapshot.completed, "failed": snapshot.failed }),
            ));
        }

        // Only flush progress while the request is still downloading; a
        // cancellation stops the loop at the next hop.
        let Some(_request) = ctx.load_in_state(&request_id, &[RequestStatus::Downloading])? else {
            ctx.downloads.remove(&download_id).await;
            return Ok(JobOutcome::ok("request is no longer downloading, monitor stops"));
        };

        let percent = snapshot.percent();
        ctx.store.set_progress(&request_id, percent)?;
        ctx.enqueue_delayed(payload, ctx.monitor_delay()).await?;

        Ok(JobOutcome::ok_with(
            "direct download in progress",
            serde_json::json!({ "percent": percent, "bytes": snapshot.bytes_downloaded }),
        ))
    }
}
