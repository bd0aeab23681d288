//! Download monitor: poll the client and advance on terminal observations.
//!
//! Polling is expressed as a self-enqueue with a fixed delay rather than an
//! in-process wait loop; each hop re-reads the request so cancellations stop
//! the chain naturally.

use async_trait::async_trait;
use tracing::info;

use crate::clients::{DownloadHandle, DownloadSnapshot, DownloadState};
use crate::jobs::{JobPayload, JobType};
use crate::pathmap;
use crate::queue::QueuedJob;
use crate::request::{DownloadHistory, DownloadStatus, Request, RequestStatus};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Polls one transfer until the client reports completion or failure.
pub struct MonitorDownloadProcessor;

#[async_trait]
impl Processor for MonitorDownloadProcessor {
    fn job_type(&self) -> JobType {
        JobType::MonitorDownload
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
        let JobPayload::MonitorDownload {
            request_id,
            download_history_id,
            download_client_id,
            download_client,
        } = payload.clone()
        else {
            return Err(ProcessorError::terminal("wrong payload for monitor processor"));
        };

        let Some(request) = ctx.load_in_state(&request_id, &[RequestStatus::Downloading])? else {
            return Ok(JobOutcome::ok("request is no longer downloading, monitor stops"));
        };

        let Some(history) = ctx.store.get_history(download_history_id)? else {
            return self
                .fail_request(ctx, &request, None, "download history row missing")
                .await;
        };

        let Some(client) = ctx.clients.download_client(download_client) else {
            return Ok(JobOutcome::skipped("download client not configured"));
        };

        let handle = DownloadHandle {
            client_id: download_client_id,
            torrent_hash: history.torrent_hash.clone(),
            nzb_id: history.nzb_id.clone(),
        };
        let snapshot = client
            .get_download(&handle)
            .await
            .map_err(ProcessorError::from_client)?;

        let Some(snapshot) = snapshot else {
            return self
                .fail_request(ctx, &request, Some(&history), "client no longer knows the download")
                .await;
        };

        match snapshot.state {
            DownloadState::Completed => {
                self.handle_completed(ctx, &request, &history, &snapshot, download_client)
                    .await
            }
            DownloadState::Failed => {
                let message = snapshot
                    .error
                    .unwrap_or_else(|| "download client reported failure".to_string());
                self.fail_request(ctx, &request, Some(&history), &message).await
            }
            _ => {
                self.handle_in_progress(ctx, &request, &history, &snapshot, payload)
                    .await
            }
        }
    }
}

impl MonitorDownloadProcessor {
    /// Terminal observation: persist the authoritative import path, advance
    /// to awaiting_import and enqueue the organizer.
    async fn handle_completed(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        history: &DownloadHistory,
        snapshot: &DownloadSnapshot,
        client: crate::clients::DownloadClientKind,
    ) -> Result<JobOutcome, ProcessorError> {
        let name = snapshot
            .name
            .clone()
            .or_else(|| history.torrent_name.clone())
            .unwrap_or_else(|| "download".to_string());

        let mapping = ctx.config.mapping_for(client);
        let reported = match &snapshot.download_path {
            Some(path) => path.clone(),
            None => pathmap::compose(
                &ctx.config.paths.download_dir,
                mapping.and_then(|m| m.custom_path.as_deref()),
                &name,
            )
            .to_string_lossy()
            .into_owned(),
        };
        // Persisted path is the organizer-visible one; it is the
        // authoritative import source for later retries.
        let local = match mapping {
            Some(m) => pathmap::transform(&reported, &m.mapping),
            None => reported,
        };

        ctx.store
            .set_history_download_path(history.id, &local, Some(&name))?;
        ctx.store
            .update_history_status(history.id, DownloadStatus::Completed, None)?;

        if ctx
            .store
            .transition(
                &request.id,
                &[RequestStatus::Downloading],
                RequestStatus::AwaitingImport,
            )?
            .is_none()
        {
            return Ok(JobOutcome::ok("request changed state during completion"));
        }

        info!(request_id = %request.id, path = %local, "download complete, import enqueued");

        ctx.enqueue(JobPayload::OrganizeFiles {
            request_id: request.id.clone(),
            audiobook_id: request.audiobook_id.clone(),
            download_path: local.clone(),
        })
        .await?;

        Ok(JobOutcome::ok_with(
            "download complete",
            serde_json::json!({ "downloadPath": local }),
        ))
    }

    /// Still transferring: update progress, log on 5% boundaries, self-enqueue.
    async fn handle_in_progress(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        history: &DownloadHistory,
        snapshot: &DownloadSnapshot,
        payload: JobPayload,
    ) -> Result<JobOutcome, ProcessorError> {
        let percent = ((snapshot.progress * 100.0) as u8).min(99);
        ctx.store.set_progress(&request.id, percent)?;
        ctx.store
            .update_history_status(history.id, DownloadStatus::Downloading, None)?;

        // Throttle: log every 5% boundary, or continuously while under 5%.
        if percent < 5 || percent / 5 > request.progress / 5 {
            info!(request_id = %request.id, percent, "download in progress");
        }

        ctx.enqueue_delayed(payload, ctx.monitor_delay()).await?;

        Ok(JobOutcome::ok_with(
            "download in progress",
            serde_json::json!({ "percent": percent }),
        ))
    }

    async fn fail_request(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        history: Option<&DownloadHistory>,
        message: &str,
    ) -> Result<JobOutcome, ProcessorError> {
        ctx.store.set_error_message(&request.id, Some(message))?;
        if let Some(history) = history {
            ctx.store
                .update_history_status(history.id, DownloadStatus::Failed, Some(message))?;
        }
        ctx.store.transition(
            &request.id,
            &[RequestStatus::Downloading],
            RequestStatus::Failed,
        )?;
        let audiobook = ctx.store.get_audiobook(&request.audiobook_id)?;
        ctx.notify_request_error(request, audiobook.as_ref(), message)
            .await;
        Ok(JobOutcome::failed(message))
    }
}
