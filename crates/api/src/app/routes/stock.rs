use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Query},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;

use gestiona_core::AggregateId;
use gestiona_inventory::{AdjustStock, AdjustmentReason, InventoryCommand, StockLevel};

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, to_json};
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/product_name"],
    filters: &[("warehouse_id", "/warehouse_id"), ("product_id", "/product_id")],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/ajustes", post(adjust_stock))
}

async fn list_stock(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<StockLevel, _>(rt.read(), params, &LIST, to_json)
}

#[derive(Debug, Deserialize)]
struct AdjustmentRequest {
    warehouse_id: AggregateId,
    product_id: AggregateId,
    #[serde(default)]
    product_name: String,
    delta: i64,
    #[serde(default)]
    reference: Option<String>,
}

/// Manual correction (inventory count, breakage). Stock never goes negative.
async fn adjust_stock(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(body): JsonBody<AdjustmentRequest>,
) -> Result<Response, ApiError> {
    if body.delta == 0 {
        return Err(ApiError::validation("delta must not be zero"));
    }
    let adjust = AdjustStock {
        tenant_id: tenant.tenant_id(),
        warehouse_id: body.warehouse_id,
        product_id: body.product_id,
        product_name: body.product_name,
        delta: body.delta,
        reason: AdjustmentReason::Manual,
        reference: body.reference,
        occurred_at: Utc::now(),
    };
    let stock_id = adjust.stock_id();
    let cmd = CmdAuth::new(InventoryCommand::AdjustStock(adjust), "inventory.stock.adjust")
        .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    uow.execute::<StockLevel>(stock_id.aggregate_id(), cmd).await?;

    let level: StockLevel = find(uow.read(), stock_id.aggregate_id(), "stock level")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        warehouse_id = %level.warehouse_id(),
        product_id = %level.product_id(),
        on_hand = level.on_hand(),
        "stock adjusted"
    );
    Ok(dto::ok(to_json(&level)?))
}
