//! Mock media library for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{ClientError, LibraryItem, MediaLibrary};

/// One recorded scan trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedScan {
    pub library_id: Option<String>,
    pub path: Option<String>,
}

/// Mock implementation of the MediaLibrary trait.
#[derive(Default)]
pub struct MockLibrary {
    items: Arc<RwLock<Vec<LibraryItem>>>,
    recent: Arc<RwLock<Vec<LibraryItem>>>,
    scans: Arc<RwLock<Vec<RecordedScan>>>,
    next_error: Arc<RwLock<Option<ClientError>>>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_items(&self, items: Vec<LibraryItem>) {
        *self.items.write().await = items;
    }

    pub async fn set_recently_added(&self, items: Vec<LibraryItem>) {
        *self.recent.write().await = items;
    }

    pub async fn fail_next(&self, error: ClientError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_scans(&self) -> Vec<RecordedScan> {
        self.scans.read().await.clone()
    }

    async fn take_error(&self) -> Option<ClientError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl MediaLibrary for MockLibrary {
    fn name(&self) -> &str {
        "mock"
    }

    async fn trigger_library_scan(
        &self,
        library_id: Option<&str>,
        path: Option<&str>,
    ) -> Result<(), ClientError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        self.scans.write().await.push(RecordedScan {
            library_id: library_id.map(|s| s.to_string()),
            path: path.map(|s| s.to_string()),
        });
        Ok(())
    }

    async fn search_library(
        &self,
        _library_id: Option<&str>,
        query: &str,
    ) -> Result<Vec<LibraryItem>, ClientError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        let query = query.to_lowercase();
        Ok(self
            .items
            .read()
            .await
            .iter()
            .filter(|item| item.title.to_lowercase().contains(&query) || query.is_empty())
            .cloned()
            .collect())
    }

    async fn recently_added(&self, limit: usize) -> Result<Vec<LibraryItem>, ClientError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.recent.read().await.iter().take(limit).cloned().collect())
    }
}
