use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use gestiona_auth::JwtValidator;
use gestiona_infra::tenancy::TenantRegistry;

use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        ApiError::Unauthenticated("invalid or expired token")
    })?;

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut().insert(PrincipalContext::new(
        claims.sub,
        claims.roles.clone(),
    ));

    Ok(next.run(req).await)
}

/// Resolve the tenant runtime. Runs after [`auth_middleware`].
pub async fn tenant_middleware(
    State(registry): State<Arc<TenantRegistry>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let tenant = req
        .extensions()
        .get::<TenantContext>()
        .copied()
        .ok_or(ApiError::Unauthenticated("missing tenant context"))?;

    let runtime = registry.runtime(tenant.tenant_id()).await?;
    req.extensions_mut().insert(TenantHandle(runtime));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let missing = ApiError::Unauthenticated("missing bearer token");

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(missing.clone())?;

    let header = header.to_str().map_err(|_| missing.clone())?;

    let header = header.strip_prefix("Bearer ").ok_or(missing.clone())?;

    let token = header.trim();
    if token.is_empty() {
        return Err(missing);
    }

    Ok(token)
}
