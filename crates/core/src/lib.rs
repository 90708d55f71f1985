//! `gestiona-core`: domain foundation building blocks.
//!
//! Pure domain primitives shared by every business module (no IO, no storage).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod money;
pub mod party;
pub mod validation;

pub use aggregate::{Aggregate, AggregateKind, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use lifecycle::{Lifecycle, ensure_transition};
pub use party::CustomerRef;
