//! Tenant-isolated read models.
//!
//! Read models are disposable: each tenant runtime rebuilds them from its
//! event stream on start and applies every committed event inline.

pub mod models;
pub mod projection;
pub mod tenant_store;

pub use models::{Projected, ReadModels};
pub use projection::{Projection, ProjectionError};
pub use tenant_store::{InMemoryTenantStore, TenantStore};
