//! Organize processor: move completed downloads into the library tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::jobs::{JobPayload, JobType};
use crate::organizer::{
    fetch_cover, is_retryable_fs_error, move_file, render_folder, scan_download, FolderTokens,
};
use crate::queue::QueuedJob;
use crate::request::{Audiobook, Request, RequestStatus};

use super::{JobOutcome, Processor, ProcessorContext, ProcessorError};

/// Moves audio files and cover art into the rendered library folder, with
/// import-retry semantics for transient filesystem states.
pub struct OrganizeFilesProcessor;

#[async_trait]
impl Processor for OrganizeFilesProcessor {
    fn job_type(&self) -> JobType {
        JobType::OrganizeFiles
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
        let JobPayload::OrganizeFiles {
            request_id,
            audiobook_id,
            download_path,
        } = payload
        else {
            return Err(ProcessorError::terminal("wrong payload for organize processor"));
        };

        let Some(request) = ctx.load_in_state(
            &request_id,
            &[RequestStatus::AwaitingImport, RequestStatus::Processing],
        )?
        else {
            return Ok(JobOutcome::ok("request is not awaiting import, nothing to do"));
        };

        // Claim the import; a concurrent organizer loses the swap and no-ops.
        if request.status == RequestStatus::AwaitingImport
            && ctx
                .store
                .transition(
                    &request_id,
                    &[RequestStatus::AwaitingImport],
                    RequestStatus::Processing,
                )?
                .is_none()
        {
            return Ok(JobOutcome::ok("another organizer claimed the request"));
        }
        ctx.store.set_progress(&request_id, 100)?;

        let Some(audiobook) = ctx.store.get_audiobook(&audiobook_id)? else {
            return self
                .fail_import(ctx, &request, None, "audiobook descriptor missing")
                .await;
        };
        let audiobook = self.resolve_year(ctx, audiobook).await;

        let tokens = FolderTokens::from(&audiobook);
        let relative = match render_folder(&ctx.config.paths.folder_template, &tokens) {
            Ok(path) => path,
            Err(e) => {
                return self
                    .fail_import(ctx, &request, Some(&audiobook), &e.to_string())
                    .await;
            }
        };
        let target_dir = ctx.config.paths.media_dir.join(relative);

        let scan = match scan_download(Path::new(&download_path)).await {
            Ok(scan) => scan,
            Err(e) if is_retryable_fs_error(&e) => {
                return self
                    .retryable_import(ctx, &request, &audiobook, &e.to_string())
                    .await;
            }
            Err(e) => {
                return self
                    .fail_import(ctx, &request, Some(&audiobook), &e.to_string())
                    .await;
            }
        };

        if scan.audio_files.is_empty() {
            // A re-run after a successful move finds the source empty but the
            // library folder populated; that is success, not a missing import.
            if target_has_audio(&target_dir).await {
                return self
                    .finish(ctx, &request, &audiobook, &target_dir, 0)
                    .await;
            }
            return self
                .retryable_import(ctx, &request, &audiobook, "no audio files found in download")
                .await;
        }

        if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
            return if is_retryable_fs_error(&e) {
                self.retryable_import(ctx, &request, &audiobook, &e.to_string())
                    .await
            } else {
                self.fail_import(ctx, &request, Some(&audiobook), &e.to_string())
                    .await
            };
        }

        let mut moved = 0usize;
        for source in &scan.audio_files {
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let destination = target_dir.join(file_name);
            match move_file(source, &destination).await {
                Ok(()) => moved += 1,
                Err(e) if is_retryable_fs_error(&e) => {
                    return self
                        .retryable_import(ctx, &request, &audiobook, &e.to_string())
                        .await;
                }
                Err(e) => {
                    return self
                        .fail_import(ctx, &request, Some(&audiobook), &e.to_string())
                        .await;
                }
            }
        }

        // Cover art is best-effort: move the downloaded one, else fetch the
        // known artwork URL.
        let cover_dest = target_dir.join("cover.jpg");
        match &scan.cover_art {
            Some(cover) => {
                if let Err(e) = move_file(cover, &cover_dest).await {
                    warn!(request_id = %request.id, "failed to move cover art: {e}");
                }
            }
            None => {
                if let Some(url) = &audiobook.cover_art_url {
                    if let Err(e) = fetch_cover(&ctx.http, url, &cover_dest).await {
                        warn!(request_id = %request.id, "failed to fetch cover art: {e}");
                    }
                }
            }
        }

        self.finish(ctx, &request, &audiobook, &target_dir, moved).await
    }
}

impl OrganizeFilesProcessor {
    /// Fill in a missing release year from the metadata cache (or provider),
    /// writing it back for future reuse. Lookup failures degrade silently.
    async fn resolve_year(&self, ctx: &ProcessorContext, audiobook: Audiobook) -> Audiobook {
        if audiobook.year.is_some() {
            return audiobook;
        }
        let Some(asin) = audiobook.asin.clone() else {
            return audiobook;
        };

        let year = match ctx.cache.get_by_asin(&asin) {
            Ok(Some(cached)) => cached.year,
            Ok(None) => match &ctx.clients.metadata {
                Some(provider) => provider
                    .get_by_asin(&asin)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|entry| entry.year),
                None => None,
            },
            Err(e) => {
                warn!(%asin, "metadata cache lookup failed: {e}");
                None
            }
        };

        let Some(year) = year else {
            return audiobook;
        };
        if let Err(e) = ctx.store.set_audiobook_year(&audiobook.id, year) {
            warn!(audiobook_id = %audiobook.id, "failed to store release year: {e}");
        }
        Audiobook {
            year: Some(year),
            ..audiobook
        }
    }

    async fn finish(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        audiobook: &Audiobook,
        target_dir: &Path,
        moved: usize,
    ) -> Result<JobOutcome, ProcessorError> {
        let target = target_dir.to_string_lossy().into_owned();
        ctx.store.set_audiobook_file_path(&audiobook.id, &target)?;
        ctx.store.set_error_message(&request.id, None)?;

        if ctx
            .store
            .transition(
                &request.id,
                &[RequestStatus::Processing],
                RequestStatus::Downloaded,
            )?
            .is_none()
        {
            return Ok(JobOutcome::ok("request changed state during organize"));
        }
        crate::metrics::REQUEST_OUTCOMES
            .with_label_values(&["downloaded"])
            .inc();
        info!(request_id = %request.id, target = %target, moved, "import organized");

        for (server, library_id) in [
            (&ctx.config.plex, ctx.config.plex.library_id.clone()),
            (
                &ctx.config.audiobookshelf,
                ctx.config.audiobookshelf.library_id.clone(),
            ),
        ] {
            if server.trigger_scan_after_import {
                ctx.enqueue(JobPayload::ScanLibrary {
                    library_id,
                    partial: true,
                    path: Some(target.clone()),
                })
                .await?;
            }
        }

        if ctx.clients.library.is_some() {
            ctx.enqueue(JobPayload::MatchLibrary {
                request_id: request.id.clone(),
                audiobook_id: audiobook.id.clone(),
                title: audiobook.title.clone(),
                author: audiobook.author.clone(),
            })
            .await?;
        }

        Ok(JobOutcome::ok_with(
            "files organized into library",
            serde_json::json!({ "target": target, "moved": moved }),
        ))
    }

    /// Import-class failure: consume an attempt, bounce back to
    /// awaiting_import while budget remains, park as warn when exhausted.
    async fn retryable_import(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        audiobook: &Audiobook,
        reason: &str,
    ) -> Result<JobOutcome, ProcessorError> {
        let attempts = ctx.store.bump_import_attempts(&request.id)?;
        ctx.store.set_error_message(&request.id, Some(reason))?;

        if attempts < request.max_import_retries {
            ctx.store.transition(
                &request.id,
                &[RequestStatus::Processing, RequestStatus::AwaitingImport],
                RequestStatus::AwaitingImport,
            )?;
            info!(
                request_id = %request.id,
                attempts,
                max = request.max_import_retries,
                "import failed, will retry: {reason}"
            );
            return Ok(JobOutcome::failed(format!(
                "import attempt {attempts} failed, returned to awaiting_import: {reason}"
            )));
        }

        ctx.store.transition(
            &request.id,
            &[RequestStatus::Processing, RequestStatus::AwaitingImport],
            RequestStatus::Warn,
        )?;
        crate::metrics::REQUEST_OUTCOMES.with_label_values(&["warn"]).inc();
        ctx.notify_request_error(request, Some(audiobook), reason).await;
        Ok(JobOutcome::failed(format!(
            "import retries exhausted ({attempts}), request needs attention: {reason}"
        )))
    }

    /// Non-import-class failure: the request is done for.
    async fn fail_import(
        &self,
        ctx: &ProcessorContext,
        request: &Request,
        audiobook: Option<&Audiobook>,
        reason: &str,
    ) -> Result<JobOutcome, ProcessorError> {
        ctx.store.set_error_message(&request.id, Some(reason))?;
        ctx.store.transition(
            &request.id,
            &[RequestStatus::Processing, RequestStatus::AwaitingImport],
            RequestStatus::Failed,
        )?;
        crate::metrics::REQUEST_OUTCOMES
            .with_label_values(&["failed"])
            .inc();
        ctx.notify_request_error(request, audiobook, reason).await;
        Ok(JobOutcome::failed(reason))
    }
}

/// Whether the library target already holds audio files.
async fn target_has_audio(target_dir: &PathBuf) -> bool {
    match scan_download(target_dir).await {
        Ok(scan) => !scan.audio_files.is_empty(),
        Err(_) => false,
    }
}
