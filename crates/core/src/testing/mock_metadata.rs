//! Mock metadata provider for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{CatalogEntry, ClientError, MetadataProvider};

/// Mock implementation of the MetadataProvider trait.
#[derive(Default)]
pub struct MockMetadataProvider {
    popular: Arc<RwLock<Vec<CatalogEntry>>>,
    new_releases: Arc<RwLock<Vec<CatalogEntry>>>,
    by_asin: Arc<RwLock<HashMap<String, CatalogEntry>>>,
}

impl MockMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_popular(&self, entries: Vec<CatalogEntry>) {
        *self.popular.write().await = entries;
    }

    pub async fn set_new_releases(&self, entries: Vec<CatalogEntry>) {
        *self.new_releases.write().await = entries;
    }

    pub async fn insert(&self, entry: CatalogEntry) {
        self.by_asin
            .write()
            .await
            .insert(entry.asin.clone(), entry);
    }
}

#[async_trait]
impl MetadataProvider for MockMetadataProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_popular(&self, count: usize) -> Result<Vec<CatalogEntry>, ClientError> {
        Ok(self.popular.read().await.iter().take(count).cloned().collect())
    }

    async fn get_new_releases(&self, count: usize) -> Result<Vec<CatalogEntry>, ClientError> {
        Ok(self
            .new_releases
            .read()
            .await
            .iter()
            .take(count)
            .cloned()
            .collect())
    }

    async fn get_by_asin(&self, asin: &str) -> Result<Option<CatalogEntry>, ClientError> {
        Ok(self.by_asin.read().await.get(asin).cloned())
    }
}
