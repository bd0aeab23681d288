//! Shelf feed sync: turn a want-to-read feed into audiobook requests.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{info, warn};

use crate::jobs::{AudiobookRef, JobPayload, JobType};
use crate::queue::QueuedJob;
use crate::request::{NewAudiobook, NewRequest, RequestFilter, RequestType};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// User id attributed to requests created by the shelf sync.
const SHELF_USER: &str = "shelf-sync";

static ITEM_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<title>([^<]+)</title>").unwrap());

/// Polls the configured shelf feed and creates requests for unseen titles.
pub struct SyncShelvesProcessor;

#[async_trait]
impl Processor for SyncShelvesProcessor {
    fn job_type(&self) -> JobType {
        JobType::SyncShelves
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::SyncShelves { .. } = payload else {
            return Err(ProcessorError::terminal("wrong payload for shelves processor"));
        };

        let Some(shelves) = ctx.config.shelves.clone() else {
            return Ok(JobOutcome::skipped("shelf feed not configured"));
        };

        let body = ctx
            .http
            .get(&shelves.feed_url)
            .send()
            .await
            .map_err(|e| ProcessorError::retryable(format!("shelf feed fetch failed: {e}")))?
            .text()
            .await
            .map_err(|e| ProcessorError::retryable(format!("shelf feed read failed: {e}")))?;

        let entries = parse_feed_titles(&body);
        if entries.is_empty() {
            return Ok(JobOutcome::ok_with(
                "shelf feed carried no entries",
                serde_json::json!({ "created": 0 }),
            ));
        }

        // Dedup against everything already requested.
        let mut seen = HashSet::new();
        let existing = ctx
            .store
            .list_requests(&RequestFilter::new().with_limit(500))?;
        for request in &existing {
            if let Some(audiobook) = ctx.store.get_audiobook(&request.audiobook_id)? {
                seen.insert(dedup_key(&audiobook.title, &audiobook.author));
            }
        }

        let mut created = 0usize;
        let mut duplicates = 0usize;
        for (title, author) in entries {
            if !seen.insert(dedup_key(&title, &author)) {
                duplicates += 1;
                continue;
            }

            let audiobook = ctx.store.create_audiobook(NewAudiobook {
                title: title.clone(),
                author: author.clone(),
                ..Default::default()
            })?;
            let request = ctx.store.create_request(NewRequest {
                user_id: SHELF_USER.to_string(),
                request_type: RequestType::Audiobook,
                audiobook_id: audiobook.id.clone(),
                max_import_retries: None,
            })?;
            ctx.enqueue(JobPayload::SearchIndexers {
                request_id: request.id,
                audiobook: AudiobookRef {
                    id: audiobook.id,
                    title,
                    author,
                    asin: None,
                },
            })
            .await?;
            created += 1;
        }

        info!(created, duplicates, "shelf sync finished");
        Ok(JobOutcome::ok_with(
            "shelf sync finished",
            serde_json::json!({ "created": created, "duplicates": duplicates }),
        ))
    }
}

/// Extract `Title by Author` pairs from feed item titles.
fn parse_feed_titles(body: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for capture in ITEM_TITLE.captures_iter(body) {
        let text = capture[1].trim();
        // The channel title and similar headers carry no " by " separator.
        let Some((title, author)) = text.rsplit_once(" by ") else {
            continue;
        };
        let title = title.trim();
        let author = author.trim();
        if title.is_empty() || author.is_empty() {
            warn!(entry = text, "shelf entry missing title or author");
            continue;
        }
        entries.push((title.to_string(), author.to_string()));
    }
    entries
}

fn dedup_key(title: &str, author: &str) -> String {
    format!("{}|{}", title.to_lowercase(), author.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_titles() {
        let body = r#"
<rss><channel>
<title>my want-to-read shelf</title>
<item><title>The Final Empire by Brandon Sanderson</title></item>
<item><title>Project Hail Mary by Andy Weir</title></item>
<item><title>no separator here</title></item>
</channel></rss>
"#;
        let entries = parse_feed_titles(body);
        assert_eq!(
            entries,
            vec![
                (
                    "The Final Empire".to_string(),
                    "Brandon Sanderson".to_string()
                ),
                ("Project Hail Mary".to_string(), "Andy Weir".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_title_with_by_in_name() {
        let body = "<item><title>Death by Black Hole by Neil deGrasse Tyson</title></item>";
        let entries = parse_feed_titles(body);
        assert_eq!(
            entries,
            vec![(
                "Death by Black Hole".to_string(),
                "Neil deGrasse Tyson".to_string()
            )]
        );
    }
}
