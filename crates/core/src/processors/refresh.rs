//! Metadata cache refresh: repopulate popular/new-release rows and manage
//! the thumbnail cache.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clients::CatalogEntry;
use crate::jobs::{JobPayload, JobType};
use crate::organizer::fetch_cover;
use crate::queue::QueuedJob;

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Repopulates the metadata cache and garbage-collects orphaned thumbnails.
pub struct RefreshMetadataCacheProcessor;

#[async_trait]
impl Processor for RefreshMetadataCacheProcessor {
    fn job_type(&self) -> JobType {
        JobType::RefreshMetadataCache
    }

    async fn process(
        &self,
        payload: JobPayload,
        ctx: &ProcessorContext,
        _job: &QueuedJob,
    ) -> Result<JobOutcome, ProcessorError> {
        let JobPayload::RefreshMetadataCache { .. } = payload else {
            return Err(ProcessorError::terminal("wrong payload for refresh processor"));
        };

        let Some(provider) = ctx.clients.metadata.clone() else {
            return Ok(JobOutcome::skipped("metadata provider not configured"));
        };

        let count = ctx.config.metadata_cache.refresh_count;
        let popular = provider
            .get_popular(count)
            .await
            .map_err(ProcessorError::from_client)?;
        let new_releases = provider
            .get_new_releases(count)
            .await
            .map_err(ProcessorError::from_client)?;

        ctx.cache.clear_flags()?;
        for entry in &popular {
            ctx.cache.upsert(entry, true, false)?;
        }
        for entry in &new_releases {
            ctx.cache.upsert(entry, false, true)?;
        }

        let thumbnails = self
            .cache_thumbnails(ctx, popular.iter().chain(new_releases.iter()))
            .await;
        let removed = self.collect_orphaned_thumbnails(ctx).await;

        info!(
            popular = popular.len(),
            new_releases = new_releases.len(),
            thumbnails,
            removed,
            "metadata cache refreshed"
        );
        Ok(JobOutcome::ok_with(
            "metadata cache refreshed",
            serde_json::json!({
                "popular": popular.len(),
                "newReleases": new_releases.len(),
                "thumbnails": thumbnails,
                "thumbnailsRemoved": removed,
            }),
        ))
    }
}

impl RefreshMetadataCacheProcessor {
    /// Fetch cover thumbnails for cache rows that advertise artwork.
    async fn cache_thumbnails<'a>(
        &self,
        ctx: &ProcessorContext,
        entries: impl Iterator<Item = &'a CatalogEntry>,
    ) -> usize {
        let dir = &ctx.config.metadata_cache.thumbnail_dir;
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), "cannot create thumbnail dir: {e}");
            return 0;
        }

        let mut cached = 0usize;
        for entry in entries {
            let Some(url) = &entry.cover_url else {
                continue;
            };
            let path = dir.join(format!("{}.jpg", entry.asin));

            if !path.exists() {
                if let Err(e) = fetch_cover(&ctx.http, url, &path).await {
                    warn!(asin = %entry.asin, "thumbnail fetch failed: {e}");
                    continue;
                }
            }
            match ctx.cache.set_thumbnail(&entry.asin, &path.to_string_lossy()) {
                Ok(()) => cached += 1,
                Err(e) => warn!(asin = %entry.asin, "thumbnail record failed: {e}"),
            }
        }
        cached
    }

    /// Remove thumbnail files no live cache row references.
    async fn collect_orphaned_thumbnails(&self, ctx: &ProcessorContext) -> usize {
        let referenced: HashSet<String> = match ctx.cache.referenced_thumbnails() {
            Ok(paths) => paths.into_iter().collect(),
            Err(e) => {
                warn!("thumbnail reference listing failed: {e}");
                return 0;
            }
        };

        let dir = &ctx.config.metadata_cache.thumbnail_dir;
        let mut removed = 0usize;
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return 0;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_thumbnail(&path) {
                continue;
            }
            if referenced.contains(path.to_string_lossy().as_ref()) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), "thumbnail removal failed: {e}"),
            }
        }
        removed
    }
}

fn is_thumbnail(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg"))
        .unwrap_or(false)
}
