//! Tenants (empresas) and their runtimes.
//!
//! The registry builds one [`TenantRuntime`] per tenant on first use and
//! caches it: the event store bound to the tenant's database, the command
//! dispatcher, the tenant's read models and its write lock.

pub mod config;
pub mod directory;
pub mod registry;
pub mod runtime;

pub use config::{CompanyProfile, DatabaseConfig, DatabaseKind, TenancyConfig, TenantConfig};
pub use directory::{TenancyError, TenantDirectory};
pub use registry::TenantRegistry;
pub use runtime::{TenantRuntime, UnitOfWork};
