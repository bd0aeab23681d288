//! Mock usenet client for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{ClientError, NzbInfo, NzbState, UsenetClient};

/// Mock implementation of the UsenetClient trait.
pub struct MockUsenetClient {
    nzbs: Arc<RwLock<HashMap<String, NzbInfo>>>,
    added: Arc<RwLock<Vec<String>>>,
    counter: Arc<RwLock<u32>>,
    default_download_path: String,
}

impl Default for MockUsenetClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUsenetClient {
    pub fn new() -> Self {
        Self {
            nzbs: Arc::new(RwLock::new(HashMap::new())),
            added: Arc::new(RwLock::new(Vec::new())),
            counter: Arc::new(RwLock::new(0)),
            default_download_path: "/mock/usenet".to_string(),
        }
    }

    pub async fn added_urls(&self) -> Vec<String> {
        self.added.read().await.clone()
    }

    /// Drive an NZB to a new state with a progress value.
    pub async fn set_state(&self, id: &str, state: NzbState, progress: f64) {
        let mut nzbs = self.nzbs.write().await;
        if let Some(nzb) = nzbs.get_mut(id) {
            nzb.progress = progress.clamp(0.0, 1.0);
            nzb.state = state;
            if state == NzbState::Completed {
                nzb.download_path =
                    Some(format!("{}/{}", self.default_download_path, nzb.name));
            }
        }
    }
}

#[async_trait]
impl UsenetClient for MockUsenetClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_nzb(&self, url: &str) -> Result<String, ClientError> {
        self.added.write().await.push(url.to_string());

        let mut counter = self.counter.write().await;
        *counter += 1;
        let id = format!("nzb-{:04}", *counter);
        drop(counter);

        self.nzbs.write().await.insert(
            id.clone(),
            NzbInfo {
                id: id.clone(),
                name: format!("nzb-{id}"),
                state: NzbState::Queued,
                progress: 0.0,
                download_path: None,
                error: None,
            },
        );
        Ok(id)
    }

    async fn get_nzb(&self, id: &str) -> Result<NzbInfo, ClientError> {
        self.nzbs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }
}
