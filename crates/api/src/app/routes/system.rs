use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use gestiona_infra::tenancy::TenantRegistry;

use crate::context::{PrincipalContext, TenantContext, TenantHandle};

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
) -> impl IntoResponse {
    crate::app::dto::ok(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "tenant_name": rt.config().name,
        "principal_id": principal.principal_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}

/// Committed events of the caller's tenant as server-sent events.
pub async fn stream(
    Extension(registry): Extension<Arc<TenantRegistry>>,
    Extension(tenant): Extension<TenantContext>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let tenant_id = tenant.tenant_id();
    let rx = registry.bus().live();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id() == tenant_id => {
            let data = serde_json::json!({
                "aggregate_type": m.aggregate_type(),
                "aggregate_id": m.aggregate_id(),
                "sequence_number": m.sequence_number(),
                "payload": m.payload(),
            });
            Some(Ok(SseEvent::default()
                .event(m.event_type())
                .data(data.to_string())))
        }
        // Lagged receivers skip what they missed.
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
