//! Download handoff: submit the selected candidate to its download client.

use async_trait::async_trait;
use tracing::info;

use crate::clients::{AddTorrentOptions, DownloadClientKind, Protocol};
use crate::jobs::{JobPayload, JobType};
use crate::queue::QueuedJob;
use crate::request::{DownloadStatus, Request, RequestStatus};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Submits the selected torrent or NZB and starts the monitor loop.
pub struct DownloadTorrentProcessor;

#[async_trait]
impl Processor for DownloadTorrentProcessor {
    fn job_type(&self) -> JobType {
        JobType::DownloadTorrent
    }

    fn concurrency(&self) -> usize {
        3
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::DownloadTorrent {
            request_id,
            release,
            ..
        } = payload
        else {
            return Err(ProcessorError::terminal("wrong payload for handoff processor"));
        };

        let Some(request) = ctx.load_in_state(&request_id, &[RequestStatus::AwaitingDownload])?
        else {
            return Ok(JobOutcome::ok("request is not awaiting download, nothing to do"));
        };

        let Some(history) = ctx.store.latest_selected_history(&request_id)? else {
            return self
                .fail_request(ctx, &request, "no selected download history row")
                .await;
        };

        let submit = match release.protocol {
            Protocol::Torrent => {
                let Some(client) = ctx.clients.torrent.clone() else {
                    return Ok(JobOutcome::skipped("torrent client not configured"));
                };
                client
                    .add_torrent(
                        &release.download_url,
                        AddTorrentOptions {
                            category: Some("audiobooks".to_string()),
                            download_path: None,
                        },
                    )
                    .await
                    .map(|id| (id, DownloadClientKind::Qbittorrent))
            }
            Protocol::Usenet => {
                let Some(client) = ctx.clients.usenet.clone() else {
                    return Ok(JobOutcome::skipped("usenet client not configured"));
                };
                client
                    .add_nzb(&release.download_url)
                    .await
                    .map(|id| (id, DownloadClientKind::Sabnzbd))
            }
            Protocol::Direct => {
                return Err(ProcessorError::terminal(
                    "direct release routed to the client handoff",
                ))
            }
        };

        let (client_id, client_kind) = match submit {
            Ok(ok) => ok,
            Err(e) if e.is_retryable() => {
                return Err(ProcessorError::Retryable(e.to_string()));
            }
            Err(e) => {
                return self
                    .fail_request(ctx, &request, &format!("download client refused: {e}"))
                    .await;
            }
        };

        match client_kind {
            DownloadClientKind::Qbittorrent => {
                ctx.store
                    .set_history_client(history.id, &client_id, Some(&client_id), None)?;
            }
            DownloadClientKind::Sabnzbd => {
                ctx.store
                    .set_history_client(history.id, &client_id, None, Some(&client_id))?;
            }
            DownloadClientKind::Direct => {}
        }
        ctx.store
            .update_history_status(history.id, DownloadStatus::Downloading, None)?;

        if ctx
            .store
            .transition(
                &request_id,
                &[RequestStatus::AwaitingDownload],
                RequestStatus::Downloading,
            )?
            .is_none()
        {
            return Ok(JobOutcome::ok("request changed state during handoff"));
        }

        info!(request_id = %request_id, client_id = %client_id, "download submitted");

        ctx.enqueue_delayed(
            JobPayload::MonitorDownload {
                request_id: request_id.clone(),
                download_history_id: history.id,
                download_client_id: client_id.clone(),
                download_client: client_kind,
            },
            ctx.monitor_delay(),
        )
        .await?;

        Ok(JobOutcome::ok_with(
            "download submitted, monitor enqueued",
            serde_json::json!({ "clientId": client_id, "client": client_kind }),
        ))
    }
}

impl DownloadTorrentProcessor {
    async fn fail_request(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        message: &str,
    ) -> Result<JobOutcome, ProcessorError> {
        ctx.store.set_error_message(&request.id, Some(message))?;
        ctx.store.transition(
            &request.id,
            &[RequestStatus::AwaitingDownload],
            RequestStatus::Failed,
        )?;
        if let Some(history) = ctx.store.latest_selected_history(&request.id)? {
            ctx.store
                .update_history_status(history.id, DownloadStatus::Failed, Some(message))?;
        }
        let audiobook = ctx.store.get_audiobook(&request.audiobook_id)?;
        ctx.notify_request_error(request, audiobook.as_ref(), message)
            .await;
        Ok(JobOutcome::failed(message))
    }
}
