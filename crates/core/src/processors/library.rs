//! Media library processors: scan triggers, soft matching, recently-added
//! promotion.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clients::LibraryItem;
use crate::jobs::{JobPayload, JobType};
use crate::queue::QueuedJob;
use crate::request::{RequestFilter, RequestStatus};
use crate::similarity::match_score;

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Score at or above which a library item is a confirmed match.
const MATCH_THRESHOLD: f64 = 0.70;

/// Asks the media server to (re)scan a library section.
pub struct ScanLibraryProcessor;

#[async_trait]
impl Processor for ScanLibraryProcessor {
    fn job_type(&self) -> JobType {
        JobType::ScanLibrary
    }

    fn concurrency(&self) -> usize {
        1
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::ScanLibrary {
            library_id, path, ..
        } = payload
        else {
            return Err(ProcessorError::terminal("wrong payload for scan processor"));
        };

        let Some(library) = ctx.clients.library.clone() else {
            return Ok(JobOutcome::skipped("media library not configured"));
        };

        let library_id = library_id
            .or_else(|| ctx.config.plex.library_id.clone())
            .or_else(|| ctx.config.audiobookshelf.library_id.clone());

        match library
            .trigger_library_scan(library_id.as_deref(), path.as_deref())
            .await
        {
            Ok(()) => Ok(JobOutcome::ok("library scan triggered")),
            // A refused scan is degraded success: the files are on disk and
            // the next periodic scan will pick them up.
            Err(e) => {
                warn!("library scan refused: {e}");
                Ok(JobOutcome::ok_with(
                    "library scan refused",
                    serde_json::json!({ "error": e.to_string() }),
                ))
            }
        }
    }
}

/// Fuzzy-matches an organized audiobook against the external library and
/// promotes the request to completed.
pub struct MatchLibraryProcessor;

#[async_trait]
impl Processor for MatchLibraryProcessor {
    fn job_type(&self) -> JobType {
        JobType::MatchLibrary
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
        let JobPayload::MatchLibrary {
            request_id,
            audiobook_id,
            title,
            author,
        } = payload
        else {
            return Err(ProcessorError::terminal("wrong payload for match processor"));
        };

        let Some(_request) = ctx.load_in_state(&request_id, &[RequestStatus::Downloaded])? else {
            return Ok(JobOutcome::ok("request is not awaiting a match, nothing to do"));
        };

        let Some(library) = ctx.clients.library.clone() else {
            return Ok(JobOutcome::skipped("media library not configured"));
        };

        let library_id = ctx
            .config
            .plex
            .library_id
            .clone()
            .or_else(|| ctx.config.audiobookshelf.library_id.clone());

        // Matching never escalates: the filesystem placement is the source
        // of truth, so lookup errors leave the request downloaded for the
        // recently-added check to promote later.
        let items = match library.search_library(library_id.as_deref(), &title).await {
            Ok(items) => items,
            Err(e) => {
                warn!(request_id = %request_id, "library search failed: {e}");
                return Ok(JobOutcome::ok_with(
                    "library match postponed",
                    serde_json::json!({ "error": e.to_string() }),
                ));
            }
        };

        let best = best_match(&items, &title, &author);
        let note = match best {
            Some((item, score)) if score >= MATCH_THRESHOLD => {
                ctx.store
                    .set_audiobook_library_match(&audiobook_id, &item.guid, &item.rating_key)?;
                info!(request_id = %request_id, guid = %item.guid, score, "library match confirmed");
                serde_json::json!({ "matched": true, "guid": item.guid, "score": score })
            }
            Some((_, score)) => {
                info!(request_id = %request_id, score, "best match below threshold");
                serde_json::json!({ "matched": false, "score": score })
            }
            None => serde_json::json!({ "matched": false }),
        };

        // Completed either way; the files are on disk.
        ctx.store.transition(
            &request_id,
            &[RequestStatus::Downloaded],
            RequestStatus::Completed,
        )?;
        crate::metrics::REQUEST_OUTCOMES
            .with_label_values(&["completed"])
            .inc();

        Ok(JobOutcome::ok_with("request completed", note))
    }
}

/// Promotes downloaded requests whose titles appear in the media server's
/// recently-added feed.
pub struct RecentlyAddedCheckProcessor;

#[async_trait]
impl Processor for RecentlyAddedCheckProcessor {
    fn job_type(&self) -> JobType {
        JobType::RecentlyAddedCheck
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::RecentlyAddedCheck { .. } = payload else {
            return Err(ProcessorError::terminal(
                "wrong payload for recently-added processor",
            ));
        };

        let Some(library) = ctx.clients.library.clone() else {
            return Ok(JobOutcome::skipped("media library not configured"));
        };

        let filter = RequestFilter::new()
            .with_status(RequestStatus::Downloaded)
            .with_limit(100);
        let requests = ctx.store.list_requests(&filter)?;
        if requests.is_empty() {
            return Ok(JobOutcome::ok_with(
                "no downloaded requests to check",
                serde_json::json!({ "checked": 0, "completed": 0 }),
            ));
        }

        let recent = match library.recently_added(100).await {
            Ok(items) => items,
            Err(e) => {
                warn!("recently-added fetch failed: {e}");
                return Ok(JobOutcome::ok_with(
                    "recently-added feed unavailable",
                    serde_json::json!({ "error": e.to_string() }),
                ));
            }
        };

        let mut completed = 0usize;
        for request in &requests {
            let Some(audiobook) = ctx.store.get_audiobook(&request.audiobook_id)? else {
                continue;
            };
            let Some((item, score)) = best_match(&recent, &audiobook.title, &audiobook.author)
            else {
                continue;
            };
            if score < MATCH_THRESHOLD {
                continue;
            }

            ctx.store
                .set_audiobook_library_match(&audiobook.id, &item.guid, &item.rating_key)?;
            if ctx
                .store
                .transition(
                    &request.id,
                    &[RequestStatus::Downloaded],
                    RequestStatus::Completed,
                )?
                .is_some()
            {
                crate::metrics::REQUEST_OUTCOMES
                    .with_label_values(&["completed"])
                    .inc();
                completed += 1;
                info!(request_id = %request.id, guid = %item.guid, "request completed via recently-added");
            }
        }

        Ok(JobOutcome::ok_with(
            "recently-added check finished",
            serde_json::json!({ "checked": requests.len(), "completed": completed }),
        ))
    }
}

/// Best-scoring library item for a title/author pair.
fn best_match<'a>(
    items: &'a [LibraryItem],
    title: &str,
    author: &str,
) -> Option<(&'a LibraryItem, f64)> {
    items
        .iter()
        .map(|item| {
            (
                item,
                match_score(title, &item.title, author, &item.author),
            )
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, author: &str) -> LibraryItem {
        LibraryItem {
            guid: format!("guid-{title}"),
            rating_key: "1".to_string(),
            title: title.to_string(),
            author: author.to_string(),
        }
    }

    #[test]
    fn test_best_match_picks_highest_score() {
        let items = vec![
            item("Warbreaker", "Brandon Sanderson"),
            item("The Final Empire", "Brandon Sanderson"),
        ];
        let (best, score) = best_match(&items, "The Final Empire", "Brandon Sanderson").unwrap();
        assert_eq!(best.title, "The Final Empire");
        assert!(score >= MATCH_THRESHOLD);
    }

    #[test]
    fn test_unrelated_items_stay_below_threshold() {
        let items = vec![item("Project Hail Mary", "Andy Weir")];
        let (_, score) = best_match(&items, "The Final Empire", "Brandon Sanderson").unwrap();
        assert!(score < MATCH_THRESHOLD);
    }
}
