//! HTTP API application wiring.
//!
//! - `routes/`: one file per resource, mounted under `/api`
//! - `dto.rs`: response envelope, request bodies and list queries
//! - `workflows.rs`: multi-aggregate operations shared by several routes
//! - `errors.rs`: error envelope and status mapping

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use gestiona_auth::Hs256JwtValidator;
use gestiona_infra::event_bus::RealtimeBus;
use gestiona_infra::tenancy::{TenantDirectory, TenantRegistry};

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod workflows;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &AppConfig) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(config.auth.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let bus = Arc::new(RealtimeBus::default());
    let registry = Arc::new(TenantRegistry::new(
        TenantDirectory::new(&config.tenancy),
        bus,
    ));

    // Layers run bottom-up: authenticate, then resolve the tenant runtime.
    let protected = routes::router()
        .layer(Extension(registry.clone()))
        .layer(axum::middleware::from_fn_with_state(
            registry,
            middleware::tenant_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", protected)
        .layer(ServiceBuilder::new())
}
