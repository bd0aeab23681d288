//! Search processor: query indexers, rank candidates, select one.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clients::{DownloadClientKind, Protocol, ReleaseCandidate, ReleaseQuery};
use crate::jobs::{JobPayload, JobType};
use crate::organizer::sanitize_component;
use crate::queue::QueuedJob;
use crate::ranking;
use crate::request::{NewDownloadHistory, Request, RequestStatus};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Searches the indexer aggregator for a request and hands the best ranked
/// candidate to the matching download path.
pub struct SearchIndexersProcessor;

#[async_trait]
impl Processor for SearchIndexersProcessor {
    fn job_type(&self) -> JobType {
        JobType::SearchIndexers
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
        let JobPayload::SearchIndexers {
            request_id,
            audiobook,
        } = payload
        else {
            return Err(ProcessorError::terminal("wrong payload for search processor"));
        };

        // Idempotence: a request already past awaiting_search is a no-op.
        let Some(request) = ctx.load_in_state(&request_id, &[RequestStatus::AwaitingSearch])? else {
            return Ok(JobOutcome::ok("request is not awaiting search, nothing to do"));
        };

        let Some(indexer) = ctx.clients.indexer.clone() else {
            return Ok(JobOutcome::skipped("indexer aggregator not configured"));
        };

        let query = ReleaseQuery {
            title: audiobook.title.clone(),
            author: audiobook.author.clone(),
            asin: audiobook.asin.clone(),
        };
        let candidates = indexer
            .search(&query)
            .await
            .map_err(ProcessorError::from_client)?;

        if candidates.is_empty() {
            return self.handle_empty_result(ctx, &request).await;
        }

        let ranked = ranking::rank(&candidates, &ctx.config.indexers);
        let best = &ranked[0];
        info!(
            request_id = %request_id,
            candidate = %best.candidate.title,
            indexer = %best.candidate.indexer_name,
            score = best.score,
            "selected candidate"
        );

        match best.candidate.protocol {
            Protocol::Direct => self.select_direct(ctx, &request, &best.candidate).await,
            Protocol::Torrent | Protocol::Usenet => {
                self.select_client_download(ctx, &request, &audiobook, &best.candidate)
                    .await
            }
        }
    }
}

impl SearchIndexersProcessor {
    /// No candidates: stay in awaiting_search for the scheduled retry, or
    /// fail after the configured maximum of empty rounds.
    async fn handle_empty_result(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
    ) -> Result<JobOutcome, ProcessorError> {
        let attempts = ctx.store.bump_download_attempts(&request.id)?;
        if attempts >= ctx.config.search.max_attempts {
            let message = format!("no candidates found after {attempts} search rounds");
            ctx.store.set_error_message(&request.id, Some(&message))?;
            ctx.store.transition(
                &request.id,
                &[RequestStatus::AwaitingSearch],
                RequestStatus::Failed,
            )?;
            let audiobook = ctx.store.get_audiobook(&request.audiobook_id)?;
            ctx.notify_request_error(request, audiobook.as_ref(), &message)
                .await;
            return Ok(JobOutcome::failed(message));
        }

        Ok(JobOutcome::ok_with(
            "no candidates found, will retry on schedule",
            serde_json::json!({ "searchRounds": attempts }),
        ))
    }

    /// Torrent/usenet candidate: record the selection and enqueue the
    /// handoff.
    async fn select_client_download(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        audiobook: &crate::jobs::AudiobookRef,
        candidate: &ReleaseCandidate,
    ) -> Result<JobOutcome, ProcessorError> {
        let client = match candidate.protocol {
            Protocol::Usenet => DownloadClientKind::Sabnzbd,
            _ => DownloadClientKind::Qbittorrent,
        };

        // Claim the request before touching history; a concurrent search
        // losing this swap must not disturb the winner's selected row.
        if ctx
            .store
            .transition(
                &request.id,
                &[RequestStatus::AwaitingSearch],
                RequestStatus::AwaitingDownload,
            )?
            .is_none()
        {
            warn!(request_id = %request.id, "request moved during selection, leaving it alone");
            return Ok(JobOutcome::ok("request changed state during selection"));
        }

        let history = ctx.store.insert_history(NewDownloadHistory {
            request_id: request.id.clone(),
            download_client: client,
            download_client_id: None,
            torrent_hash: None,
            nzb_id: None,
            torrent_name: Some(candidate.title.clone()),
            indexer_name: Some(candidate.indexer_name.clone()),
            torrent_url: Some(candidate.download_url.clone()),
        })?;

        ctx.enqueue(JobPayload::DownloadTorrent {
            request_id: request.id.clone(),
            audiobook: audiobook.clone(),
            release: candidate.clone(),
        })
        .await?;

        Ok(JobOutcome::ok_with(
            "candidate selected, download handoff enqueued",
            serde_json::json!({
                "historyId": history.id,
                "indexer": candidate.indexer_name,
                "protocol": candidate.protocol,
            }),
        ))
    }

    /// Direct candidate (e-book sidecar): record the mirror list and enqueue
    /// the direct download.
    async fn select_direct(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        candidate: &ReleaseCandidate,
    ) -> Result<JobOutcome, ProcessorError> {
        let mut mirrors = vec![candidate.download_url.clone()];
        mirrors.extend(candidate.mirror_urls.iter().cloned());
        mirrors.truncate(ctx.config.ebook.mirror_limit);

        let mirrors_json = serde_json::to_string(&mirrors)
            .map_err(|e| ProcessorError::terminal(format!("unserializable mirror list: {e}")))?;

        if ctx
            .store
            .transition(
                &request.id,
                &[RequestStatus::AwaitingSearch],
                RequestStatus::AwaitingDownload,
            )?
            .is_none()
        {
            return Ok(JobOutcome::ok("request changed state during selection"));
        }

        let history = ctx.store.insert_history(NewDownloadHistory {
            request_id: request.id.clone(),
            download_client: DownloadClientKind::Direct,
            download_client_id: None,
            torrent_hash: None,
            nzb_id: None,
            torrent_name: Some(candidate.title.clone()),
            indexer_name: Some(candidate.indexer_name.clone()),
            torrent_url: Some(mirrors_json),
        })?;

        let audiobook = ctx.store.get_audiobook(&request.audiobook_id)?;
        let base_name = match &audiobook {
            Some(a) => format!("{} - {}", a.author, a.title),
            None => candidate.title.clone(),
        };
        let target_filename = format!(
            "{}.{}",
            sanitize_component(&base_name),
            ctx.config.ebook.preferred_format
        );

        ctx.enqueue(JobPayload::StartDirectDownload {
            request_id: request.id.clone(),
            download_history_id: history.id,
            mirror_urls: mirrors.clone(),
            target_filename,
            expected_size: Some(candidate.size_bytes).filter(|s| *s > 0),
        })
        .await?;

        Ok(JobOutcome::ok_with(
            "direct candidate selected, download enqueued",
            serde_json::json!({ "historyId": history.id, "mirrors": mirrors.len() }),
        ))
    }
}
