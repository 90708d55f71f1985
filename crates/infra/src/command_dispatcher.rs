//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream (tenant-scoped) and check it is well formed
//!   ↓
//! 2. Rehydrate the aggregate from its history
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with an exact expected version (optimistic concurrency)
//!   ↓
//! 5. Publish the committed events
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use gestiona_core::{AggregateId, AggregateKind, DomainError, ExpectedVersion, TenantId};
use gestiona_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale stream version or a domain-level conflict (duplicate create).
    #[error("conflict: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// A historical payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// The append succeeded; only publication failed.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine.
///
/// Events are appended before they are published, so a publish failure
/// leaves them persisted (at-least-once delivery).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the aggregate stored under `aggregate_id`.
    ///
    /// Returns the committed events; empty when the command was a no-op.
    pub async fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: AggregateKind<Error = DomainError> + Send,
        A::Command: Send,
        A::Event: gestiona_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id).await?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let aggregate = rehydrate::<A>(aggregate_id, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(tenant_id, aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected).await?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Reject streams a buggy backend could hand back: foreign tenant or
/// aggregate, zero or non-increasing sequence numbers.
fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

/// Rebuild an aggregate from its stored history.
pub fn rehydrate<A>(aggregate_id: AggregateId, history: &[StoredEvent]) -> Result<A, DispatchError>
where
    A: AggregateKind,
    A::Event: DeserializeOwned,
{
    let mut aggregate = A::empty(aggregate_id);
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use gestiona_personnel::{
        CreateEmployee, Employee, EmployeeCommand, EmployeeDetails, EmployeeId, StartLeave,
    };

    use crate::event_bus::RealtimeBus;
    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<RealtimeBus>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(RealtimeBus::default()))
    }

    fn details() -> EmployeeDetails {
        EmployeeDetails {
            code: "emp-1".to_string(),
            first_name: "Lucía".to_string(),
            last_name: "García".to_string(),
            tax_id: "12345678Z".to_string(),
            email: None,
            phone: None,
            position: None,
            department: None,
            hire_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            hourly_cost: 18_00,
            notes: None,
        }
    }

    fn create(tenant_id: TenantId, id: EmployeeId) -> EmployeeCommand {
        EmployeeCommand::Create(CreateEmployee {
            tenant_id,
            employee_id: id,
            details: details(),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn dispatch_persists_and_publishes() {
        let d = dispatcher();
        let mut live = d.bus().live();
        let tenant = TenantId::new();
        let id = EmployeeId::generate();

        let committed = d
            .dispatch::<Employee>(tenant, id.aggregate_id(), create(tenant, id))
            .await
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].aggregate_type, "personnel.employee");
        assert_eq!(live.try_recv().unwrap().event_type(), committed[0].event_type);
    }

    #[tokio::test]
    async fn domain_errors_are_mapped() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let id = EmployeeId::generate();

        let missing = d
            .dispatch::<Employee>(
                tenant,
                id.aggregate_id(),
                EmployeeCommand::StartLeave(StartLeave {
                    tenant_id: tenant,
                    employee_id: id,
                    occurred_at: Utc::now(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, DispatchError::NotFound));

        d.dispatch::<Employee>(tenant, id.aggregate_id(), create(tenant, id)).await.unwrap();
        let dup = d
            .dispatch::<Employee>(tenant, id.aggregate_id(), create(tenant, id))
            .await
            .unwrap_err();
        assert!(matches!(dup, DispatchError::Concurrency(_)));
    }

    #[tokio::test]
    async fn rehydrate_replays_history() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let id = EmployeeId::generate();
        d.dispatch::<Employee>(tenant, id.aggregate_id(), create(tenant, id)).await.unwrap();

        let history = d.store().load_stream(tenant, id.aggregate_id()).await.unwrap();
        let employee = rehydrate::<Employee>(id.aggregate_id(), &history).unwrap();
        assert_eq!(employee.details().code, "EMP-1");
    }
}
