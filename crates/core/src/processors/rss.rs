//! RSS monitor: screen feed items against waiting requests.

use async_trait::async_trait;
use tracing::info;

use crate::jobs::{AudiobookRef, JobPayload, JobType};
use crate::queue::QueuedJob;
use crate::request::{RequestFilter, RequestStatus};
use crate::similarity::rss_item_matches;

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// How many waiting requests one sweep considers.
const REQUEST_WINDOW: i64 = 100;

/// Fetches the combined RSS feed and enqueues a search for every waiting
/// request with a plausible item.
pub struct MonitorRssFeedsProcessor;

#[async_trait]
impl Processor for MonitorRssFeedsProcessor {
    fn job_type(&self) -> JobType {
        JobType::MonitorRssFeeds
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::MonitorRssFeeds { .. } = payload else {
            return Err(ProcessorError::terminal("wrong payload for rss processor"));
        };

        let rss_indexers: Vec<i64> = ctx
            .config
            .indexers
            .iter()
            .filter(|i| i.rss_enabled)
            .map(|i| i.id)
            .collect();
        if rss_indexers.is_empty() {
            return Ok(JobOutcome::ok_with(
                "no rss-enabled indexers configured",
                serde_json::json!({ "skipped": true }),
            ));
        }

        let Some(indexer) = ctx.clients.indexer.clone() else {
            return Ok(JobOutcome::skipped("indexer aggregator not configured"));
        };

        let items = indexer
            .fetch_rss_feeds(&rss_indexers)
            .await
            .map_err(ProcessorError::from_client)?;
        if items.is_empty() {
            return Ok(JobOutcome::ok_with(
                "rss feed empty",
                serde_json::json!({ "matched": 0 }),
            ));
        }

        let filter = RequestFilter::new()
            .with_status(RequestStatus::AwaitingSearch)
            .with_limit(REQUEST_WINDOW);
        let requests = ctx.store.list_requests(&filter)?;

        let mut matched = 0usize;
        for request in &requests {
            let Some(audiobook) = ctx.store.get_audiobook(&request.audiobook_id)? else {
                continue;
            };

            // First plausible item wins; the search job does the real
            // selection work.
            for item in &items {
                if rss_item_matches(&item.title, &audiobook.author, &audiobook.title) {
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
                    matched += 1;
                    info!(request_id = %request.id, item = %item.title, "rss item matched request");
                    break;
                }
            }
        }

        Ok(JobOutcome::ok_with(
            "rss sweep finished",
            serde_json::json!({ "items": items.len(), "matched": matched }),
        ))
    }
}
