use serde::de::DeserializeOwned;
use thiserror::Error;

use gestiona_core::{AggregateId, AggregateKind, TenantId};

use crate::event_store::StoredEvent;

use super::tenant_store::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("event for tenant {found} applied to the read models of tenant {expected}")]
    TenantMismatch { expected: TenantId, found: TenantId },

    #[error("no read model for aggregate type '{0}'")]
    UnknownAggregateType(String),

    #[error("stream {aggregate_id} expected sequence {expected}, got {found}")]
    OutOfOrder {
        aggregate_id: AggregateId,
        expected: u64,
        found: u64,
    },

    #[error("failed to deserialize '{event_type}': {message}")]
    Deserialize { event_type: String, message: String },
}

/// Current state of every live aggregate of one type, for one tenant.
///
/// The projection replays the aggregate's own `apply`, so the read model is
/// exactly the state the command side would rehydrate.
#[derive(Debug)]
pub struct Projection<A> {
    tenant_id: TenantId,
    store: InMemoryTenantStore<AggregateId, (AggregateId, A)>,
}

impl<A> Projection<A>
where
    A: AggregateKind + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned,
{
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            store: InMemoryTenantStore::new(),
        }
    }

    /// Apply one stored event. Returns `false` for an event already applied.
    pub fn apply(&self, stored: &StoredEvent) -> Result<bool, ProjectionError> {
        let id = stored.aggregate_id;
        let mut current = self
            .store
            .get(self.tenant_id, &id)
            .map(|(_, a)| a)
            .unwrap_or_else(|| A::empty(id));

        let version = current.version();
        if stored.sequence_number <= version {
            return Ok(false);
        }
        if stored.sequence_number != version + 1 {
            return Err(ProjectionError::OutOfOrder {
                aggregate_id: id,
                expected: version + 1,
                found: stored.sequence_number,
            });
        }

        let event: A::Event =
            serde_json::from_value(stored.payload.clone()).map_err(|e| ProjectionError::Deserialize {
                event_type: stored.event_type.clone(),
                message: e.to_string(),
            })?;
        current.apply(&event);

        if current.exists() {
            self.store.upsert(self.tenant_id, id, (id, current));
        } else {
            self.store.remove(self.tenant_id, &id);
        }
        Ok(true)
    }
}

impl<A> Projection<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub fn get(&self, id: AggregateId) -> Option<A> {
        self.store.get(self.tenant_id, &id).map(|(_, a)| a)
    }

    /// Live aggregates in creation order (ids are time-ordered).
    pub fn list(&self) -> Vec<(AggregateId, A)> {
        let mut items = self.store.list(self.tenant_id);
        items.sort_by_key(|(id, _)| *id);
        items
    }

    pub fn clear(&self) {
        self.store.clear_tenant(self.tenant_id);
    }
}
