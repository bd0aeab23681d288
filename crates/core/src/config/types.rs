use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::clients::DownloadClientKind;
use crate::pathmap::PathMapping;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub indexers: Vec<IndexerConfig>,
    #[serde(default)]
    pub plex: MediaServerConfig,
    #[serde(default)]
    pub audiobookshelf: MediaServerConfig,
    #[serde(default)]
    pub ebook: EbookConfig,
    #[serde(default)]
    pub path_mappings: Vec<ClientPathMapping>,
    #[serde(default)]
    pub metadata_cache: MetadataCacheConfig,
    #[serde(default)]
    pub shelves: Option<ShelvesConfig>,
}

impl Config {
    /// Path mapping entry for a download client, if one is configured.
    pub fn mapping_for(&self, client: DownloadClientKind) -> Option<&ClientPathMapping> {
        self.path_mappings.iter().find(|m| m.client == client)
    }

    /// Indexer configuration looked up by display name.
    pub fn indexer_by_name(&self, name: &str) -> Option<&IndexerConfig> {
        self.indexers.iter().find(|i| i.name == name)
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("shelfarr.db")
}

/// Filesystem roots and the library folder template.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Where download clients drop completed downloads.
    pub download_dir: PathBuf,
    /// Root of the organized audiobook library.
    pub media_dir: PathBuf,
    /// Folder template expanded per audiobook. Required tokens: {author}, {title}.
    #[serde(default = "default_folder_template")]
    pub folder_template: String,
}

fn default_folder_template() -> String {
    "{author}/{title} {asin}".to_string()
}

/// Queue broker tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Default attempts per job before it parks as failed.
    #[serde(default = "default_attempts")]
    pub default_attempts: u32,
    /// Initial exponential-backoff delay in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_initial_ms: u64,
    /// Delay between download monitor polls, in seconds.
    #[serde(default = "default_monitor_poll")]
    pub monitor_poll_secs: u64,
    /// Spacing between bulk enqueues in the recurring retry jobs.
    #[serde(default = "default_enqueue_spacing")]
    pub enqueue_spacing_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_attempts: default_attempts(),
            backoff_initial_ms: default_backoff_ms(),
            monitor_poll_secs: default_monitor_poll(),
            enqueue_spacing_ms: default_enqueue_spacing(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    2000
}

fn default_monitor_poll() -> u64 {
    10
}

fn default_enqueue_spacing() -> u64 {
    100
}

/// Search behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Empty search rounds before a request is failed outright.
    #[serde(default = "default_max_search_attempts")]
    pub max_attempts: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_search_attempts(),
        }
    }
}

fn default_max_search_attempts() -> u32 {
    10
}

/// One configured indexer as known to the aggregator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    pub id: i64,
    pub name: String,
    /// Lower value wins ties; mirrors the aggregator's priority scale.
    #[serde(default = "default_indexer_priority")]
    pub priority: i32,
    /// Minimum seeding time before cleanup may remove the torrent.
    /// Zero means unlimited: never clean.
    #[serde(default)]
    pub seeding_time_minutes: u64,
    #[serde(default)]
    pub rss_enabled: bool,
    #[serde(default)]
    pub categories: Vec<i64>,
}

fn default_indexer_priority() -> i32 {
    25
}

/// Media-server scan settings (one section per backend).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MediaServerConfig {
    #[serde(default)]
    pub trigger_scan_after_import: bool,
    #[serde(default)]
    pub library_id: Option<String>,
}

/// E-book sidecar download settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EbookConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_ebook_format")]
    pub preferred_format: String,
    #[serde(default)]
    pub flaresolverr_url: Option<String>,
    /// Maximum slow-download mirrors tried per request.
    #[serde(default = "default_mirror_limit")]
    pub mirror_limit: usize,
}

impl Default for EbookConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            preferred_format: default_ebook_format(),
            flaresolverr_url: None,
            mirror_limit: default_mirror_limit(),
        }
    }
}

fn default_ebook_format() -> String {
    "epub".to_string()
}

fn default_mirror_limit() -> usize {
    5
}

/// Remote-to-local path mapping for one download client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientPathMapping {
    pub client: DownloadClientKind,
    #[serde(flatten)]
    pub mapping: PathMapping,
    /// Client-specific subdirectory under the download dir.
    #[serde(default)]
    pub custom_path: Option<String>,
}

/// Metadata cache refresh settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataCacheConfig {
    /// How many popular and new-release entries to keep cached.
    #[serde(default = "default_refresh_count")]
    pub refresh_count: usize,
    /// Where cover thumbnails are cached on disk.
    #[serde(default = "default_thumbnail_dir")]
    pub thumbnail_dir: PathBuf,
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        Self {
            refresh_count: default_refresh_count(),
            thumbnail_dir: default_thumbnail_dir(),
        }
    }
}

fn default_refresh_count() -> usize {
    20
}

fn default_thumbnail_dir() -> PathBuf {
    PathBuf::from("cache/thumbs")
}

/// Shelf-feed sync settings. Absent section disables the job.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShelvesConfig {
    pub feed_url: String,
}
