//! Client-side payment watcher.
//!
//! Follows one public id from `pending` to a terminal status. The transport
//! is a [`StatusFeed`]; remembering the in-flight id across restarts is a
//! [`WatchPersistence`] supplied by the caller.
//!
//! Order of operations: authenticate, point read, subscribe, then one
//! catch-up read. The catch-up read covers an update that lands between the
//! first read and the subscription becoming active. There is no timeout; wrap
//! the future in `tokio::time::timeout` if the caller needs one.

pub mod http;
pub mod local;
pub mod persistence;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

use crate::models::payment::PaymentStatus;

pub use http::ApiClient;
pub use local::StoreStatusFeed;
pub use persistence::{FilePersistence, MemoryPersistence, WatchPersistence};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to authenticate session: {0}")]
    Auth(String),

    #[error("Payment {0} not found")]
    UnknownPayment(String),

    /// Carries the most specific message available for a failed request.
    #[error("{0}")]
    Request(String),

    #[error("Status feed error: {0}")]
    Feed(String),

    #[error("Status subscription ended before a terminal status")]
    SubscriptionClosed,

    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),
}

pub type StatusUpdates = BoxStream<'static, Result<PaymentStatus, WatchError>>;

#[async_trait]
pub trait StatusFeed: Send + Sync {
    /// Opens a session scoped to `public_id`.
    async fn authenticate(&self, public_id: &str) -> Result<(), WatchError>;

    async fn current_status(&self, public_id: &str) -> Result<Option<PaymentStatus>, WatchError>;

    /// Status updates for `public_id`. Dropping the stream unsubscribes.
    async fn subscribe(&self, public_id: &str) -> Result<StatusUpdates, WatchError>;
}

pub struct PaymentWatcher<F, P> {
    feed: F,
    persistence: P,
}

impl<F, P> PaymentWatcher<F, P>
where
    F: StatusFeed,
    P: WatchPersistence,
{
    pub fn new(feed: F, persistence: P) -> Self {
        PaymentWatcher { feed, persistence }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Remembers `public_id`, then watches it.
    pub async fn track<S>(&self, public_id: &str, on_status: S) -> Result<PaymentStatus, WatchError>
    where
        S: FnMut(PaymentStatus) + Send,
    {
        self.persistence.set(public_id)?;
        self.watch(public_id, on_status).await
    }

    /// Watches the remembered id, if any.
    pub async fn resume<S>(&self, on_status: S) -> Result<Option<PaymentStatus>, WatchError>
    where
        S: FnMut(PaymentStatus) + Send,
    {
        match self.persistence.get() {
            Some(public_id) => self.watch(&public_id, on_status).await.map(Some),
            None => Ok(None),
        }
    }

    /// Surfaces every status observed for `public_id` and resolves with the
    /// terminal one. The remembered id is cleared once it resolves.
    pub async fn watch<S>(&self, public_id: &str, mut on_status: S) -> Result<PaymentStatus, WatchError>
    where
        S: FnMut(PaymentStatus) + Send,
    {
        self.feed.authenticate(public_id).await?;

        let current = match self.feed.current_status(public_id).await? {
            Some(status) => status,
            None => {
                self.persistence.clear()?;
                return Err(WatchError::UnknownPayment(public_id.to_string()));
            }
        };

        on_status(current);
        if current.is_terminal() {
            return self.finish(public_id, current);
        }

        let mut updates = self.feed.subscribe(public_id).await?;

        if let Some(status) = self.feed.current_status(public_id).await? {
            if status.is_terminal() {
                on_status(status);
                return self.finish(public_id, status);
            }
        }

        while let Some(update) = updates.next().await {
            let status = update?;
            on_status(status);
            if status.is_terminal() {
                return self.finish(public_id, status);
            }
        }

        Err(WatchError::SubscriptionClosed)
    }

    fn finish(&self, public_id: &str, status: PaymentStatus) -> Result<PaymentStatus, WatchError> {
        tracing::debug!(%public_id, %status, "payment reached terminal status");
        self.persistence.clear()?;
        Ok(status)
    }
}
