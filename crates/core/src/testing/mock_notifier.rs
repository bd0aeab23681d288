//! Mock notification bus for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{ClientError, NotificationBus, NotificationKind};

/// Mock implementation of the NotificationBus trait.
#[derive(Default)]
pub struct MockNotifier {
    published: Arc<RwLock<Vec<(NotificationKind, serde_json::Value)>>>,
    next_error: Arc<RwLock<Option<ClientError>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(NotificationKind, serde_json::Value)> {
        self.published.read().await.clone()
    }

    pub async fn fail_next(&self, error: ClientError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl NotificationBus for MockNotifier {
    async fn publish(
        &self,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), ClientError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.published.write().await.push((kind, payload));
        Ok(())
    }
}
