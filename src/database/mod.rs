//! Payment persistence and row-level change notification.

pub mod connection;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::Result;
use crate::models::payment::{PaymentOutcome, PaymentRecord, StatusChange};

pub use connection::MongoPaymentStore;
pub use memory::InMemoryPaymentStore;

/// Updates to one payment, in the order the store applied them.
pub type StatusStream = BoxStream<'static, Result<StatusChange>>;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, record: &PaymentRecord) -> Result<()>;

    async fn find(&self, public_id: &str) -> Result<Option<PaymentRecord>>;

    /// Overwrites the status of the matching record and returns how many
    /// records matched (0 or 1).
    ///
    /// There is no precondition on the current status, so a late or duplicate
    /// callback can flip a terminal payment. Deduplication would need the
    /// provider's retry semantics pinned down first.
    async fn update_status(&self, public_id: &str, outcome: &PaymentOutcome) -> Result<u64>;

    /// Subscribes to updates of a single record. Only changes applied after
    /// the call returns are delivered.
    async fn subscribe(&self, public_id: &str) -> Result<StatusStream>;

    async fn ping(&self) -> Result<()>;

    fn backend(&self) -> &'static str;
}
