use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use gestiona_core::AggregateId;
use gestiona_inventory::{
    CancelTransfer, ConfirmReception, ConfirmShipment, ConfirmTransfer, CreateTransfer,
    DeleteTransfer, LineQuantity, Transfer, TransferCommand, TransferId, TransferLineInput,
    UpdateTransfer,
};

use crate::app::dto::{self, JsonBody, ListSpec, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json, today};
use crate::app::workflows;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/number", "/notes", "/lines/0/product_name"],
    filters: &[
        ("status", "/status"),
        ("origin_warehouse_id", "/origin_warehouse_id"),
        ("destination_warehouse_id", "/destination_warehouse_id"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transfers).post(create_transfer))
        .route(
            "/:id",
            get(get_transfer).put(update_transfer).delete(delete_transfer),
        )
        .route("/:id/confirmar", post(confirm_transfer))
        .route("/:id/confirmar-salida", post(ship_transfer))
        .route("/:id/confirmar-recepcion", post(receive_transfer))
        .route("/:id/anular", post(cancel_transfer))
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    origin_warehouse_id: AggregateId,
    destination_warehouse_id: AggregateId,
    lines: Vec<TransferLineInput>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QuantitiesRequest {
    #[serde(default)]
    lines: Vec<LineQuantity>,
}

async fn list_transfers(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Transfer, _>(rt.read(), params, &LIST, to_json)
}

async fn get_transfer(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let transfer: Transfer = find(rt.read(), parse_id(&id, "transfer")?, "transfer")?;
    Ok(dto::ok(to_json(&transfer)?))
}

async fn create_transfer(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(body): JsonBody<TransferRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "inventory.transfers.create")?;
    let transfer_id = TransferId::generate();

    let uow = rt.begin().await;
    let number = workflows::next_number::<Transfer, _>(uow.read(), "TRA", today(), Transfer::number);
    uow.execute::<Transfer>(
        transfer_id.aggregate_id(),
        TransferCommand::Create(CreateTransfer {
            tenant_id: tenant.tenant_id(),
            transfer_id,
            number: number.clone(),
            origin_warehouse_id: body.origin_warehouse_id,
            destination_warehouse_id: body.destination_warehouse_id,
            lines: body.lines,
            notes: body.notes,
            by: principal.user_id(),
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    tracing::info!(tenant_id = %tenant.tenant_id(), transfer = %number, "transfer created");
    Ok(dto::created(to_json(&find::<Transfer>(
        uow.read(),
        transfer_id.aggregate_id(),
        "transfer",
    )?)?))
}

async fn update_transfer(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<TransferRequest>,
) -> Result<Response, ApiError> {
    let transfer_id = TransferId::new(parse_id(&id, "transfer")?);
    let cmd = CmdAuth::new(
        TransferCommand::Update(UpdateTransfer {
            tenant_id: tenant.tenant_id(),
            transfer_id,
            origin_warehouse_id: body.origin_warehouse_id,
            destination_warehouse_id: body.destination_warehouse_id,
            lines: body.lines,
            notes: body.notes,
            occurred_at: Utc::now(),
        }),
        "inventory.transfers.update",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Transfer>(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    uow.execute::<Transfer>(transfer_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<Transfer>(
        uow.read(),
        transfer_id.aggregate_id(),
        "transfer",
    )?)?))
}

async fn delete_transfer(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let transfer_id = TransferId::new(parse_id(&id, "transfer")?);
    let cmd = CmdAuth::new(
        TransferCommand::Delete(DeleteTransfer {
            tenant_id: tenant.tenant_id(),
            transfer_id,
            occurred_at: Utc::now(),
        }),
        "inventory.transfers.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Transfer>(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    uow.execute::<Transfer>(transfer_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": transfer_id }), "transfer deleted"))
}

async fn confirm_transfer(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let transfer_id = TransferId::new(parse_id(&id, "transfer")?);
    let cmd = CmdAuth::new(
        TransferCommand::Confirm(ConfirmTransfer {
            tenant_id: tenant.tenant_id(),
            transfer_id,
            by: principal.user_id(),
            occurred_at: Utc::now(),
        }),
        "inventory.transfers.confirm",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Transfer>(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    uow.execute::<Transfer>(transfer_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<Transfer>(
        uow.read(),
        transfer_id.aggregate_id(),
        "transfer",
    )?)?))
}

/// Ship the goods: checks origin stock and takes it out of the origin warehouse.
async fn ship_transfer(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    body: Option<JsonBody<QuantitiesRequest>>,
) -> Result<Response, ApiError> {
    let transfer_id = TransferId::new(parse_id(&id, "transfer")?);
    authz::require(&tenant, &principal, "inventory.transfers.ship")?;
    let shipped = body.map(|JsonBody(b)| b.lines).unwrap_or_default();
    let now = Utc::now();

    let uow = rt.begin().await;
    let transfer: Transfer = find(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    let available = workflows::origin_stock(uow.read(), &transfer);
    let committed = uow
        .execute::<Transfer>(
            transfer_id.aggregate_id(),
            TransferCommand::ConfirmShipment(ConfirmShipment {
                tenant_id: tenant.tenant_id(),
                transfer_id,
                shipped,
                available,
                by: principal.user_id(),
                occurred_at: now,
            }),
        )
        .await?;

    let transfer: Transfer = find(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    workflows::apply_transfer_stock(&uow, tenant.tenant_id(), &transfer, &committed, now).await?;
    Ok(dto::ok(to_json(&transfer)?))
}

/// Receive the goods (whole or partial) into the destination warehouse.
async fn receive_transfer(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    body: Option<JsonBody<QuantitiesRequest>>,
) -> Result<Response, ApiError> {
    let transfer_id = TransferId::new(parse_id(&id, "transfer")?);
    authz::require(&tenant, &principal, "inventory.transfers.receive")?;
    let received = body.map(|JsonBody(b)| b.lines).unwrap_or_default();
    let now = Utc::now();

    let uow = rt.begin().await;
    find::<Transfer>(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    let committed = uow
        .execute::<Transfer>(
            transfer_id.aggregate_id(),
            TransferCommand::ConfirmReception(ConfirmReception {
                tenant_id: tenant.tenant_id(),
                transfer_id,
                received,
                by: principal.user_id(),
                occurred_at: now,
            }),
        )
        .await?;

    let transfer: Transfer = find(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    workflows::apply_transfer_stock(&uow, tenant.tenant_id(), &transfer, &committed, now).await?;
    Ok(dto::ok(to_json(&transfer)?))
}

/// Cancel; goods already in transit go back to the origin warehouse.
async fn cancel_transfer(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReasonRequest>,
) -> Result<Response, ApiError> {
    let transfer_id = TransferId::new(parse_id(&id, "transfer")?);
    authz::require(&tenant, &principal, "inventory.transfers.cancel")?;
    let now = Utc::now();

    let uow = rt.begin().await;
    find::<Transfer>(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    let committed = uow
        .execute::<Transfer>(
            transfer_id.aggregate_id(),
            TransferCommand::Cancel(CancelTransfer {
                tenant_id: tenant.tenant_id(),
                transfer_id,
                reason: body.reason,
                by: principal.user_id(),
                occurred_at: now,
            }),
        )
        .await?;

    let transfer: Transfer = find(uow.read(), transfer_id.aggregate_id(), "transfer")?;
    let returned =
        workflows::apply_transfer_stock(&uow, tenant.tenant_id(), &transfer, &committed, now).await?;
    tracing::info!(tenant_id = %tenant.tenant_id(), transfer = %transfer.number(), returned, "transfer cancelled");
    Ok(dto::ok(to_json(&transfer)?))
}
