use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use gestiona_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct StreamKey {
    tenant_id: uuid::Uuid,
    aggregate_id: AggregateId,
}

impl StreamKey {
    fn new(tenant_id: TenantId, aggregate_id: AggregateId) -> Self {
        Self {
            tenant_id: *tenant_id.as_uuid(),
            aggregate_id,
        }
    }
}

/// In-memory append-only event store.
///
/// Intended for tests and development. Streams of one tenant are kept
/// together so `load_tenant` is a range scan.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<BTreeMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        validate_batch(&events)?;
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let key = StreamKey::new(first.tenant_id, first.aggregate_id);
        let aggregate_type = first.aggregate_type.clone();

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(streams
            .get(&StreamKey::new(tenant_id, aggregate_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let from = StreamKey::new(tenant_id, AggregateId::nil());
        Ok(streams
            .range(from..)
            .take_while(|(k, _)| k.tenant_id == *tenant_id.as_uuid())
            .flat_map(|(_, stream)| stream.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.thing.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn sequence_numbers_continue_across_appends() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        let first = store
            .append(vec![event(t, a, "x"), event(t, a, "x")], ExpectedVersion::Exact(0))
            .await
            .unwrap();
        let second = store.append(vec![event(t, a, "x")], ExpectedVersion::Exact(2)).await.unwrap();

        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(store.load_stream(t, a).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        store.append(vec![event(t, a, "x")], ExpectedVersion::Exact(0)).await.unwrap();

        let err = store.append(vec![event(t, a, "x")], ExpectedVersion::Exact(0)).await.unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[tokio::test]
    async fn mixed_tenants_in_one_batch_are_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let err = store
            .append(
                vec![event(TenantId::new(), a, "x"), event(TenantId::new(), a, "x")],
                ExpectedVersion::Any,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }

    #[tokio::test]
    async fn aggregate_type_is_fixed_per_stream() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        store.append(vec![event(t, a, "x")], ExpectedVersion::Any).await.unwrap();

        let err = store.append(vec![event(t, a, "y")], ExpectedVersion::Any).await.unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[tokio::test]
    async fn load_tenant_only_returns_that_tenant() {
        let store = InMemoryEventStore::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        for _ in 0..3 {
            store.append(vec![event(t1, AggregateId::new(), "x")], ExpectedVersion::Exact(0)).await.unwrap();
        }
        store.append(vec![event(t2, AggregateId::new(), "x")], ExpectedVersion::Exact(0)).await.unwrap();

        let events = store.load_tenant(t1).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.tenant_id == t1));
    }
}
