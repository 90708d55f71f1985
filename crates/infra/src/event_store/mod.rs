//! Append-only event store boundary.
//!
//! Tenant-scoped event streams behind one async trait, with an in-memory
//! backend for development and tests and a PostgreSQL backend for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
