use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::{PaymentStore, StatusStream};
use crate::errors::{AppError, Result};
use crate::models::payment::{PaymentOutcome, PaymentRecord, StatusChange};

const CHANNEL_CAPACITY: usize = 256;

/// Process-local store. Used when no `DATABASE_URL` is configured and in
/// tests; change notification rides on a broadcast channel.
#[derive(Clone)]
pub struct InMemoryPaymentStore {
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
    changes: broadcast::Sender<StatusChange>,
}

impl Default for InMemoryPaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may fall behind before it resyncs.
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        InMemoryPaymentStore {
            records: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.public_id) {
            return Err(AppError::persistence(format!(
                "duplicate public_id {}",
                record.public_id
            )));
        }
        records.insert(record.public_id.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, public_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self.records.read().await.get(public_id).cloned())
    }

    async fn update_status(&self, public_id: &str, outcome: &PaymentOutcome) -> Result<u64> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(public_id) else {
            return Ok(0);
        };
        record.apply(outcome);

        // No receivers is not an error.
        let _ = self.changes.send(StatusChange {
            public_id: public_id.to_string(),
            status: record.status,
        });
        Ok(1)
    }

    async fn subscribe(&self, public_id: &str) -> Result<StatusStream> {
        let receiver = self.changes.subscribe();
        let records = self.records.clone();
        let public_id = public_id.to_string();

        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let records = records.clone();
            let public_id = public_id.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(change) if change.public_id == public_id => {
                            return Some((Ok::<_, AppError>(change), receiver));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(%public_id, skipped, "status subscriber lagged");
                            // A skipped change may have been this record's; resync from the map.
                            let status = records.read().await.get(&public_id).map(|r| r.status);
                            if let Some(status) = status {
                                let change = StatusChange { public_id, status };
                                return Some((Ok(change), receiver));
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
