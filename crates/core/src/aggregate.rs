//! Aggregate root traits for event-sourced domain models.

use crate::error::{DomainError, DomainResult};
use crate::id::AggregateId;

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied to this instance.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO. They only describe what happened.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event (+1 version per event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Stream-level metadata every persisted aggregate type provides.
///
/// Used by the dispatcher to rehydrate instances and by projections to
/// maintain the current-state read model of each stream.
pub trait AggregateKind: Aggregate {
    /// Stable stream type name (e.g. `"restaurant.table"`).
    const AGGREGATE_TYPE: &'static str;

    /// A not-yet-created instance ready for rehydration.
    fn empty(id: AggregateId) -> Self;

    /// `false` until created, and again once soft-deleted.
    fn exists(&self) -> bool;
}
