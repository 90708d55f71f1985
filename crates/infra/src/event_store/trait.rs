use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use gestiona_core::{AggregateId, ExpectedVersion, TenantId};

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Lifecycle of an event:
///
/// 1. **Domain event**: produced by an aggregate's `handle()`
/// 2. **UncommittedEvent**: serialized and wrapped with stream metadata
/// 3. **StoredEvent**: persisted with its sequence number
/// 4. **EventEnvelope**: published to the bus for realtime consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A persisted event.
///
/// Sequence numbers are assigned by the store, start at 1 and grow by one per
/// event within a stream (`tenant_id` + `aggregate_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped envelope for publication.
    pub fn to_envelope(&self) -> gestiona_events::EventEnvelope<JsonValue> {
        gestiona_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, isolation), as opposed to
/// domain errors.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Append-only, tenant-scoped event store.
///
/// Streams are keyed by `(tenant_id, aggregate_id)`.
///
/// `append()`:
/// - rejects batches that mix tenants, aggregates or aggregate types
/// - checks `expected_version` against the current stream version
/// - assigns sequence numbers starting at `current_version + 1`
/// - persists the whole batch or nothing
///
/// `load_stream()` returns one stream in sequence order (empty if the
/// aggregate was never created). `load_tenant()` returns every stream of a
/// tenant, each in sequence order, and is used to rebuild read models.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version).await
    }

    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id).await
    }

    async fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_tenant(tenant_id).await
    }
}

impl UncommittedEvent {
    /// Serialize a typed domain event and capture its metadata.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: gestiona_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Check that a batch targets exactly one stream and one aggregate type.
pub(crate) fn validate_batch(events: &[UncommittedEvent]) -> Result<(), EventStoreError> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    for (idx, e) in events.iter().enumerate() {
        if e.tenant_id != first.tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "batch contains multiple tenant_ids (index {idx})"
            )));
        }
        if e.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
    }
    Ok(())
}
