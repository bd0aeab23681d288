//! Notification bus interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClientError;

/// Kinds of user-facing notifications the pipeline emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestComplete,
    RequestError,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RequestComplete => "request_complete",
            NotificationKind::RequestError => "request_error",
        }
    }
}

/// Trait for notification backends.
///
/// Publishing is best-effort everywhere it is called; a failing bus never
/// masks the primary outcome of a processor.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn publish(
        &self,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), ClientError>;
}
