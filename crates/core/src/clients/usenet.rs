//! Usenet client interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClientError;

/// State of an NZB as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NzbState {
    Queued,
    Downloading,
    Extracting,
    Completed,
    Failed,
}

/// Snapshot of one NZB download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NzbInfo {
    pub id: String,
    pub name: String,
    pub state: NzbState,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Final extraction directory, present once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Trait for usenet client backends.
#[async_trait]
pub trait UsenetClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Submit an NZB by URL; returns the client-side id.
    async fn add_nzb(&self, url: &str) -> Result<String, ClientError>;

    /// Get an NZB by client-side id.
    async fn get_nzb(&self, id: &str) -> Result<NzbInfo, ClientError>;
}
