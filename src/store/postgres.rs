//! PostgreSQL event store backed by a bounded sqlx pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{EventStore, StoreError, StoreResult, StoreStatus};
use crate::event::{StoredEvent, WebhookEvent};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS webhook_events (
        id BIGSERIAL PRIMARY KEY,
        request_id TEXT NOT NULL,
        author TEXT NOT NULL,
        action TEXT NOT NULL,
        from_branch TEXT,
        to_branch TEXT,
        occurred_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        raw_payload JSONB,
        received_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_webhook_events_occurred_at
    ON webhook_events (occurred_at DESC, id DESC)
    "#,
];

/// Connection settings for [`PgEventStore`].
#[derive(Debug, Clone)]
pub struct PgStoreOptions {
    pub database_url: String,
    pub max_connections: u32,
    /// Bounds pool acquisition and every individual store call.
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct PgEventStore {
    pool: PgPool,
    timeout: Duration,
    schema: OnceCell<()>,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    request_id: String,
    author: String,
    action: String,
    from_branch: Option<String>,
    to_branch: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            request_id: row.request_id,
            author: row.author,
            action: row.action,
            from_branch: row.from_branch,
            to_branch: row.to_branch,
            occurred_at: row.occurred_at,
        }
    }
}

impl PgEventStore {
    /// Builds the pool without connecting, so an unreachable database at boot
    /// only degrades requests instead of stopping the process.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] when the connection string cannot be
    /// parsed.
    pub fn connect_lazy(options: &PgStoreOptions) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.timeout)
            .connect_lazy(&options.database_url)
            .map_err(StoreError::query)?;
        Ok(Self {
            pool,
            timeout: options.timeout,
            schema: OnceCell::new(),
        })
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        self.schema
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    self.bounded(sqlx::query(statement).execute(&self.pool))
                        .await?;
                }
                tracing::info!("webhook_events schema ready");
                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(())
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(StoreError::Unavailable(format!(
                "no response within {:?}",
                self.timeout
            ))),
        }
    }
}

/// Splits sqlx failures into connectivity problems and rejected statements.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => StoreError::Unavailable(err.to_string()),
        other => StoreError::query(other),
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: &WebhookEvent) -> StoreResult<i64> {
        self.ensure_schema().await?;
        let query = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO webhook_events
                (request_id, author, action, from_branch, to_branch, occurred_at, raw_payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&event.request_id)
        .bind(&event.author)
        .bind(event.action.as_str())
        .bind(event.from_branch.as_deref())
        .bind(event.to_branch.as_deref())
        .bind(event.occurred_at)
        .bind(Json(&event.raw_payload))
        .fetch_one(&self.pool);
        self.bounded(query).await
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<StoredEvent>> {
        self.ensure_schema().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, request_id, author, action, from_branch, to_branch, occurred_at
            FROM webhook_events
            ORDER BY occurred_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool);
        let rows = self.bounded(query).await?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        self.ensure_schema().await?;
        let query = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM webhook_events")
            .fetch_one(&self.pool);
        let count = self.bounded(query).await?;
        Ok(StoreStatus {
            backend: "postgres",
            event_count: u64::try_from(count).unwrap_or_default(),
        })
    }

    async fn purge(&self) -> StoreResult<u64> {
        self.ensure_schema().await?;
        let mut tx = self.bounded(self.pool.begin()).await?;
        let deleted = self
            .bounded(sqlx::query("DELETE FROM webhook_events").execute(&mut *tx))
            .await?
            .rows_affected();
        self.bounded(
            sqlx::query("ALTER SEQUENCE webhook_events_id_seq RESTART WITH 1").execute(&mut *tx),
        )
        .await?;
        self.bounded(tx.commit()).await?;
        tracing::info!(deleted, "purged webhook_events");
        Ok(deleted)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
