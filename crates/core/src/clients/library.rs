//! Media server (library scanner) interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClientError;

/// One item discovered in the external media library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryItem {
    /// Stable external identifier.
    pub guid: String,
    /// Server-side lookup key.
    pub rating_key: String,
    pub title: String,
    pub author: String,
}

/// Trait for media server backends.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Trigger a (partial) library rescan.
    async fn trigger_library_scan(
        &self,
        library_id: Option<&str>,
        path: Option<&str>,
    ) -> Result<(), ClientError>;

    /// Search the library for items matching a query.
    async fn search_library(
        &self,
        library_id: Option<&str>,
        query: &str,
    ) -> Result<Vec<LibraryItem>, ClientError>;

    /// Recently added items, newest first.
    async fn recently_added(&self, limit: usize) -> Result<Vec<LibraryItem>, ClientError>;
}
