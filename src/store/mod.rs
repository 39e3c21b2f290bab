//! Event persistence port and its backends.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::event::{StoredEvent, WebhookEvent};

mod memory;
mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::{PgEventStore, PgStoreOptions};

/// Result type for event store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Event persistence contract.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists one event and returns the id assigned to it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend cannot be reached
    /// within its timeout.
    async fn insert(&self, event: &WebhookEvent) -> StoreResult<i64>;

    /// Returns up to `limit` events, newest `occurred_at` first. Events with
    /// equal timestamps come back most recently inserted first.
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<StoredEvent>>;

    /// Probes connectivity and counts stored events.
    async fn status(&self) -> StoreResult<StoreStatus>;

    /// Deletes every stored event and returns how many were removed.
    async fn purge(&self) -> StoreResult<u64>;

    /// Releases backend resources. Further calls report
    /// [`StoreError::Unavailable`].
    async fn close(&self);
}

/// Snapshot returned by [`EventStore::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub backend: &'static str,
    pub event_count: u64,
}

/// Errors returned by event store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be reached, timed out, or has been closed.
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the operation.
    #[error("event store query failed: {0}")]
    Query(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn query(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Query(Arc::new(err))
    }

    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
