//! E-book download page scraper interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClientError;

/// A resolved direct-download link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedDownload {
    pub url: String,
    pub format: String,
}

/// Trait for the e-book scraper backend.
///
/// Mirror pages hide the actual file URL behind interstitials; the scraper
/// resolves them, preferring the configured format when a page offers several.
#[async_trait]
pub trait EbookScraper: Send + Sync {
    async fn extract_download_url(
        &self,
        page_url: &str,
        preferred_format: &str,
    ) -> Result<Option<ResolvedDownload>, ClientError>;
}
