//! In-process event store for local runs and tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{EventStore, StoreError, StoreResult, StoreStatus};
use crate::event::{StoredEvent, WebhookEvent};

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: RwLock<Inner>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    records: Vec<Record>,
}

/// A stored event plus the delivery body it was normalized from.
#[derive(Debug)]
struct Record {
    event: StoredEvent,
    raw_payload: Value,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("memory store closed".to_owned()));
        }
        Ok(())
    }

    /// Delivery body kept for audit alongside the event with `id`.
    pub async fn raw_payload(&self, id: i64) -> Option<Value> {
        let inner = self.inner.read().await;
        inner
            .records
            .iter()
            .find(|record| record.event.id == id)
            .map(|record| record.raw_payload.clone())
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: &WebhookEvent) -> StoreResult<i64> {
        self.ensure_open()?;
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(Record {
            event: StoredEvent {
                id,
                request_id: event.request_id.clone(),
                author: event.author.clone(),
                action: event.action.to_string(),
                from_branch: event.from_branch.clone(),
                to_branch: event.to_branch.clone(),
                occurred_at: event.occurred_at,
            },
            raw_payload: event.raw_payload.clone(),
        });
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<StoredEvent>> {
        self.ensure_open()?;
        let inner = self.inner.read().await;
        let mut events: Vec<StoredEvent> =
            inner.records.iter().map(|record| record.event.clone()).collect();
        events.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        events.truncate(limit);
        Ok(events)
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        self.ensure_open()?;
        let inner = self.inner.read().await;
        Ok(StoreStatus {
            backend: "memory",
            event_count: inner.records.len() as u64,
        })
    }

    async fn purge(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        let mut inner = self.inner.write().await;
        let removed = inner.records.len() as u64;
        *inner = Inner::default();
        Ok(removed)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
