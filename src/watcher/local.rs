use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use super::{StatusFeed, StatusUpdates, WatchError};
use crate::database::PaymentStore;
use crate::models::payment::PaymentStatus;

/// In-process feed reading the store directly. Access rules are the
/// caller's concern, so `authenticate` is a no-op.
#[derive(Clone)]
pub struct StoreStatusFeed {
    store: Arc<dyn PaymentStore>,
}

impl StoreStatusFeed {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        StoreStatusFeed { store }
    }
}

#[async_trait]
impl StatusFeed for StoreStatusFeed {
    async fn authenticate(&self, _public_id: &str) -> Result<(), WatchError> {
        Ok(())
    }

    async fn current_status(&self, public_id: &str) -> Result<Option<PaymentStatus>, WatchError> {
        let record = self
            .store
            .find(public_id)
            .await
            .map_err(|e| WatchError::Feed(e.to_string()))?;
        Ok(record.map(|record| record.status))
    }

    async fn subscribe(&self, public_id: &str) -> Result<StatusUpdates, WatchError> {
        let changes = self
            .store
            .subscribe(public_id)
            .await
            .map_err(|e| WatchError::Feed(e.to_string()))?;

        Ok(changes
            .map(|change| {
                change
                    .map(|change| change.status)
                    .map_err(|e| WatchError::Feed(e.to_string()))
            })
            .boxed())
    }
}
