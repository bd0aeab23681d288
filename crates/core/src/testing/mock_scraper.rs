//! Mock e-book scraper for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{ClientError, EbookScraper, ResolvedDownload};

/// Mock implementation of the EbookScraper trait.
///
/// Resolution is scripted per page URL; unscripted pages resolve to `None`,
/// matching a mirror that hides its file link.
#[derive(Default)]
pub struct MockScraper {
    resolutions: Arc<RwLock<HashMap<String, ResolvedDownload>>>,
    requested: Arc<RwLock<Vec<String>>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&self, page_url: &str, file_url: &str, format: &str) {
        self.resolutions.write().await.insert(
            page_url.to_string(),
            ResolvedDownload {
                url: file_url.to_string(),
                format: format.to_string(),
            },
        );
    }

    pub async fn requested_pages(&self) -> Vec<String> {
        self.requested.read().await.clone()
    }
}

#[async_trait]
impl EbookScraper for MockScraper {
    async fn extract_download_url(
        &self,
        page_url: &str,
        _preferred_format: &str,
    ) -> Result<Option<ResolvedDownload>, ClientError> {
        self.requested.write().await.push(page_url.to_string());
        Ok(self.resolutions.read().await.get(page_url).cloned())
    }
}
