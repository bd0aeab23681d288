//! External metadata provider interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClientError;

/// One catalog entry from the metadata provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub asin: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_part: Option<String>,
}

/// Trait for metadata provider backends.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Currently popular titles.
    async fn get_popular(&self, count: usize) -> Result<Vec<CatalogEntry>, ClientError>;

    /// Recent releases.
    async fn get_new_releases(&self, count: usize) -> Result<Vec<CatalogEntry>, ClientError>;

    /// Look up one title by ASIN.
    async fn get_by_asin(&self, asin: &str) -> Result<Option<CatalogEntry>, ClientError>;
}
