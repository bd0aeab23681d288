//! Seeded-torrent cleanup: delete torrents that met their seeding duty.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clients::{ClientError, DownloadClientKind};
use crate::jobs::{JobPayload, JobType};
use crate::queue::QueuedJob;
use crate::request::{RequestFilter, RequestStatus};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// How many completed requests one sweep considers.
const REQUEST_WINDOW: i64 = 100;

/// Removes (with data) torrents whose cumulative seeding time satisfies the
/// per-indexer minimum.
pub struct CleanupSeededTorrentsProcessor;

#[async_trait]
impl Processor for CleanupSeededTorrentsProcessor {
    fn job_type(&self) -> JobType {
        JobType::CleanupSeededTorrents
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::CleanupSeededTorrents { .. } = payload else {
            return Err(ProcessorError::terminal("wrong payload for cleanup processor"));
        };

        let Some(client) = ctx.clients.torrent.clone() else {
            return Ok(JobOutcome::skipped("torrent client not configured"));
        };

        let filter = RequestFilter::new()
            .with_status(RequestStatus::Completed)
            .with_limit(REQUEST_WINDOW);
        let requests = ctx.store.list_requests(&filter)?;

        let mut cleaned = 0usize;
        let mut still_seeding = 0usize;
        let mut unlimited = 0usize;

        for request in &requests {
            let Some(history) = ctx.store.latest_selected_history(&request.id)? else {
                continue;
            };
            if history.download_client != DownloadClientKind::Qbittorrent {
                continue;
            }
            let Some(hash) = history
                .torrent_hash
                .as_deref()
                .or(history.download_client_id.as_deref())
            else {
                continue;
            };

            // Zero minutes means unlimited: never clean.
            let minimum_minutes = history
                .indexer_name
                .as_deref()
                .and_then(|name| ctx.config.indexer_by_name(name))
                .map(|i| i.seeding_time_minutes)
                .unwrap_or(0);
            if minimum_minutes == 0 {
                unlimited += 1;
                continue;
            }

            let info = match client.get_torrent(hash).await {
                Ok(info) => info,
                Err(ClientError::NotFound(_)) => continue,
                Err(e) => {
                    warn!(request_id = %request.id, "torrent lookup failed during cleanup: {e}");
                    continue;
                }
            };

            if info.seeding_time_secs >= minimum_minutes * 60 {
                match client.delete_torrent(hash, true).await {
                    Ok(()) => {
                        cleaned += 1;
                        info!(request_id = %request.id, hash, "seeded torrent cleaned");
                    }
                    Err(e) => warn!(request_id = %request.id, "torrent delete failed: {e}"),
                }
            } else {
                still_seeding += 1;
            }
        }

        Ok(JobOutcome::ok_with(
            "seeded-torrent cleanup finished",
            serde_json::json!({
                "cleaned": cleaned,
                "stillSeeding": still_seeding,
                "unlimited": unlimited,
            }),
        ))
    }
}
