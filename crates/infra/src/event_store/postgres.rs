//! PostgreSQL-backed event store.
//!
//! One pool per tenant database. Tenant isolation is still enforced in every
//! query, since several tenants may share a database.
//!
//! | SQLx error | SQLSTATE | EventStoreError |
//! |------------|----------|-----------------|
//! | unique violation | `23505` | `Concurrency` |
//! | check / FK violation | `23514` / `23503` | `InvalidAppend` |
//! | any other | - | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use gestiona_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id        UUID PRIMARY KEY,
    tenant_id       UUID NOT NULL,
    aggregate_id    UUID NOT NULL,
    aggregate_type  TEXT NOT NULL,
    sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
    event_type      TEXT NOT NULL,
    event_version   INTEGER NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    payload         JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (tenant_id, aggregate_id, sequence_number)
)
"#;

const SELECT_COLUMNS: &str = "event_id, tenant_id, aggregate_id, aggregate_type, sequence_number, \
     event_type, event_version, occurred_at, payload";

/// Append-only event store on a PostgreSQL `events` table.
///
/// `append` checks the stream version inside a transaction. A concurrent
/// writer that slips in between the check and the insert trips the unique
/// `(tenant_id, aggregate_id, sequence_number)` key and surfaces as
/// [`EventStoreError::Concurrency`].
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool on `url` and make sure the `events` table exists.
    #[instrument(skip(url), err)]
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    fn rows_to_events(rows: Vec<PgRow>) -> Result<Vec<StoredEvent>, EventStoreError> {
        rows.iter()
            .map(|row| {
                StoredEventRow::from_row(row)
                    .map(StoredEvent::from)
                    .map_err(|e| EventStoreError::Backend(format!("failed to read event row: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        validate_batch(&events)?;
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let (tenant_id, aggregate_id) = (first.tenant_id, first.aggregate_id);
        let aggregate_type = first.aggregate_type.clone();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) = check_stream_version(&mut tx, tenant_id, aggregate_id).await?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut stored_events = Vec::with_capacity(events.len());
        let mut next_sequence = current_version + 1;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                    event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next_sequence as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;

            stored_events.push(StoredEvent {
                event_id: event.event_id,
                tenant_id,
                aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next_sequence,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next_sequence += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(stored_events)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id), err)]
    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events \
             WHERE tenant_id = $1 AND aggregate_id = $2 ORDER BY sequence_number ASC"
        );
        let rows = sqlx::query(&sql)
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        Self::rows_to_events(rows)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events \
             WHERE tenant_id = $1 ORDER BY created_at ASC, aggregate_id ASC, sequence_number ASC"
        );
        let rows = sqlx::query(&sql)
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_tenant", e))?;

        Self::rows_to_events(rows)
    }
}

/// `(current_version, aggregate_type)` of a stream; `(0, None)` when it does not exist.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: Option<i64> = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::Backend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::Backend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current_version.unwrap_or(0) as u64, aggregate_type))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23503") | Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[derive(Debug)]
struct StoredEventRow {
    event_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    aggregate_id: uuid::Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl<'r> FromRow<'r, PgRow> for StoredEventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            tenant_id: row.try_get("tenant_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            payload: row.payload,
        }
    }
}
