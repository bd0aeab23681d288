// Allow some clippy lints that are too noisy for this codebase
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::collapsible_if)]

pub mod app;
pub mod cache;
pub mod clients;
pub mod config;
pub mod direct;
pub mod jobs;
pub mod metrics;
pub mod organizer;
pub mod pathmap;
pub mod processors;
pub mod queue;
pub mod ranking;
pub mod request;
pub mod scheduler;
pub mod similarity;

/// Testing utilities and mock implementations for E2E tests.
///
/// This module provides mock implementations of all external service traits,
/// allowing comprehensive E2E testing without real infrastructure.
pub mod testing;

pub use app::{App, AppError};
pub use cache::{CacheError, CachedItem, MetadataCacheStore, SqliteMetadataCache};
pub use clients::{
    AddTorrentOptions, CatalogEntry, ClientError, ClientSet, DownloadClient, DownloadClientKind,
    DownloadHandle, DownloadSnapshot, DownloadState, EbookScraper, IndexerAggregator, LibraryItem,
    MediaLibrary, MetadataProvider, NotificationBus, NotificationKind, NzbInfo, NzbState, Protocol,
    ReleaseCandidate, ReleaseQuery, ResolvedDownload, RssItem, TorrentClient,
    TorrentDownloadAdapter, TorrentInfo, TorrentState, UsenetClient, UsenetDownloadAdapter,
};
pub use config::{
    load_config, load_config_from_str, validate_config, ClientPathMapping, Config, ConfigError,
    DatabaseConfig, EbookConfig, IndexerConfig, MediaServerConfig, MetadataCacheConfig,
    PathsConfig, QueueConfig, SearchConfig, ShelvesConfig,
};
pub use direct::{
    stream_to_file, DirectDownloadError, DirectDownloadProgress, DirectDownloadRegistry,
    DirectDownloadState, ATTEMPT_TIMEOUT, PROGRESS_INTERVAL,
};
pub use jobs::{
    AudiobookRef, Job, JobError, JobPatch, JobPayload, JobStatus, JobStore, JobType, NewJob,
    SqliteJobStore, StoreListener,
};
pub use organizer::{
    fetch_cover, is_audio_file, is_cover_art, is_retryable_fs_error, move_file, render_folder,
    sanitize_component, scan_download, CoverError, FolderTokens, ScanResult, TemplateError,
    AUDIO_EXTENSIONS, COVER_TIMEOUT, DEFAULT_TEMPLATE,
};
pub use pathmap::{compose, transform, PathMapping};
pub use processors::{
    all_processors, CleanupSeededTorrentsProcessor, DownloadTorrentProcessor, JobOutcome,
    MatchLibraryProcessor, MonitorDirectDownloadProcessor, MonitorDownloadProcessor,
    MonitorRssFeedsProcessor, OrganizeFilesProcessor, Processor, ProcessorContext, ProcessorError,
    ProcessorHandler, RecentlyAddedCheckProcessor, RefreshMetadataCacheProcessor,
    RetryFailedImportsProcessor, RetryMissingSearchProcessor, ScanLibraryProcessor,
    SearchIndexersProcessor, SendNotificationProcessor, StartDirectDownloadProcessor,
    SyncShelvesProcessor,
};
pub use queue::{
    EnqueueOptions, JobHandler, MemoryBroker, NullListener, QueueBroker, QueueCounts, QueueError,
    QueueListener, QueuedJob, WorkerError,
};
pub use ranking::{rank, score_candidate, RankedCandidate};
pub use request::{
    can_transition, Audiobook, DownloadHistory, DownloadStatus, NewAudiobook, NewDownloadHistory,
    NewRequest, Request, RequestError, RequestFilter, RequestStatus, RequestStore, RequestType,
    SqliteRequestStore,
};
pub use scheduler::{
    default_jobs, CronError, ScheduleError, ScheduledJob, ScheduledJobStore, ScheduledJobType,
    Scheduler, SchedulerError, SeedJob, SqliteScheduledJobStore,
};
pub use similarity::{match_score, rss_item_matches, similarity};
