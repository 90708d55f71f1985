//! Event publishing abstraction (mechanics only).
//!
//! The bus distributes events after they have been persisted. The event store
//! stays the source of truth, so delivery is best-effort and at-least-once:
//! consumers must tolerate duplicates.

use std::sync::Arc;

/// Transport-agnostic publisher with broadcast semantics.
///
/// ```text
/// Command → Event Store (append) → Event Bus (publish) → realtime feeds
/// ```
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }
}
