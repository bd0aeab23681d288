//! Metadata cache: popular/new-release titles and their cover thumbnails.

mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::CatalogEntry;

pub use sqlite::SqliteMetadataCache;

/// Error type for metadata cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),
}

/// One cached catalog row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedItem {
    pub id: i64,
    pub asin: String,
    pub title: String,
    pub author: String,
    pub narrator: Option<String>,
    pub year: Option<i32>,
    pub cover_url: Option<String>,
    /// Locally cached cover thumbnail, if fetched.
    pub thumbnail_path: Option<String>,
    pub is_popular: bool,
    pub is_new_release: bool,
    pub updated_at: DateTime<Utc>,
}

/// Trait for metadata cache backends.
pub trait MetadataCacheStore: Send + Sync {
    /// Insert or refresh a row by ASIN, turning on the given flags.
    fn upsert(
        &self,
        entry: &CatalogEntry,
        popular: bool,
        new_release: bool,
    ) -> Result<CachedItem, CacheError>;

    /// Clear the popular/new-release flags on every row (refresh prologue).
    fn clear_flags(&self) -> Result<(), CacheError>;

    fn get_by_asin(&self, asin: &str) -> Result<Option<CachedItem>, CacheError>;

    fn set_thumbnail(&self, asin: &str, path: &str) -> Result<(), CacheError>;

    /// Every thumbnail path referenced by a live row (GC root set).
    fn referenced_thumbnails(&self) -> Result<Vec<String>, CacheError>;
}
