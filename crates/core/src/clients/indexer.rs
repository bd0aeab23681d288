//! Indexer aggregator interface.

use async_trait::async_trait;

use super::types::{ReleaseCandidate, ReleaseQuery, RssItem};
use super::ClientError;

/// Aggregated search across configured indexers (Prowlarr-style).
#[async_trait]
pub trait IndexerAggregator: Send + Sync {
    /// Search all configured indexers for a title.
    async fn search(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, ClientError>;

    /// Fetch the combined RSS feed for the given indexer ids.
    async fn fetch_rss_feeds(&self, indexer_ids: &[i64]) -> Result<Vec<RssItem>, ClientError>;
}
