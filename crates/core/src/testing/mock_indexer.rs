//! Mock indexer aggregator for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{ClientError, IndexerAggregator, ReleaseCandidate, ReleaseQuery, RssItem};

/// Mock implementation of the IndexerAggregator trait.
///
/// Returns a fixed candidate list, records queries for assertions and can
/// fail the next call with a scripted error.
#[derive(Default)]
pub struct MockIndexer {
    results: Arc<RwLock<Vec<ReleaseCandidate>>>,
    rss_items: Arc<RwLock<Vec<RssItem>>>,
    queries: Arc<RwLock<Vec<ReleaseQuery>>>,
    rss_fetches: Arc<RwLock<Vec<Vec<i64>>>>,
    next_error: Arc<RwLock<Option<ClientError>>>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_results(&self, results: Vec<ReleaseCandidate>) {
        *self.results.write().await = results;
    }

    pub async fn set_rss_items(&self, items: Vec<RssItem>) {
        *self.rss_items.write().await = items;
    }

    /// Fail the next search or RSS fetch with the given error.
    pub async fn fail_next(&self, error: ClientError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_queries(&self) -> Vec<ReleaseQuery> {
        self.queries.read().await.clone()
    }

    pub async fn recorded_rss_fetches(&self) -> Vec<Vec<i64>> {
        self.rss_fetches.read().await.clone()
    }

    async fn take_error(&self) -> Option<ClientError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl IndexerAggregator for MockIndexer {
    async fn search(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, ClientError> {
        self.queries.write().await.push(query.clone());
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.results.read().await.clone())
    }

    async fn fetch_rss_feeds(&self, indexer_ids: &[i64]) -> Result<Vec<RssItem>, ClientError> {
        self.rss_fetches.write().await.push(indexer_ids.to_vec());
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.rss_items.read().await.clone())
    }
}
