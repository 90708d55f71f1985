use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use gestiona_core::{Aggregate, AggregateId};
use gestiona_infra::read_model::ReadModels;
use gestiona_restaurant::{
    ChangeTableStatus, CreateTable, DeleteTable, Dimensions, JoinTableGroup, LeaveTableGroup,
    MoveTable, OccupancyInput, Position, Salon, Table, TableCommand, TableDetails, TableGroup,
    TableId, TableStatus, UpdateTable,
};

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/name", "/notes"],
    filters: &[
        ("salon_id", "/salon_id"),
        ("status", "/status"),
        ("active", "/active"),
        ("shape", "/shape"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_tables).post(create_table))
        .route("/agrupar", post(group_tables))
        .route("/:id", get(get_table).put(update_table).delete(delete_table))
        .route("/:id/posicion", patch(move_table))
        .route("/:id/estado", post(change_status))
        .route("/:id/desagrupar", post(ungroup_table))
}

/// Salon must exist and the number must be free inside it.
fn check_placement(read: &ReadModels, details: &TableDetails, except: Option<TableId>) -> Result<(), ApiError> {
    let salon: Salon = find(read, details.salon_id.aggregate_id(), "salon")?;
    if !salon.floor_plan().contains(&details.position) {
        return Err(ApiError::validation(format!(
            "position ({}, {}) lies outside the floor plan of '{}'",
            details.position.x,
            details.position.y,
            salon.name()
        )));
    }
    let taken = read.list::<Table>().iter().any(|(_, t)| {
        Some(t.id_typed()) != except && t.salon_id() == details.salon_id && t.number() == details.number
    });
    if taken {
        return Err(ApiError::conflict(format!(
            "table number {} already exists in salon '{}'",
            details.number,
            salon.name()
        )));
    }
    Ok(())
}

async fn list_tables(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Table, _>(rt.read(), params, &LIST, to_json)
}

async fn get_table(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let table: Table = find(rt.read(), parse_id(&id, "table")?, "table")?;
    Ok(dto::ok(to_json(&table)?))
}

async fn create_table(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<TableDetails>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "restaurant.tables.create")?;
    let table_id = TableId::generate();

    let uow = rt.begin().await;
    check_placement(uow.read(), &details, None)?;
    uow.execute::<Table>(
        table_id.aggregate_id(),
        TableCommand::Create(CreateTable {
            tenant_id: tenant.tenant_id(),
            table_id,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    let table: Table = find(uow.read(), table_id.aggregate_id(), "table")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        table_id = %table_id,
        number = table.number(),
        "table created"
    );
    Ok(dto::created(to_json(&table)?))
}

async fn update_table(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<TableDetails>,
) -> Result<Response, ApiError> {
    let table_id = TableId::new(parse_id(&id, "table")?);
    authz::require(&tenant, &principal, "restaurant.tables.update")?;

    let uow = rt.begin().await;
    find::<Table>(uow.read(), table_id.aggregate_id(), "table")?;
    check_placement(uow.read(), &details, Some(table_id))?;
    uow.execute::<Table>(
        table_id.aggregate_id(),
        TableCommand::Update(UpdateTable {
            tenant_id: tenant.tenant_id(),
            table_id,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    Ok(dto::ok(to_json(&find::<Table>(uow.read(), table_id.aggregate_id(), "table")?)?))
}

async fn delete_table(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let table_id = TableId::new(parse_id(&id, "table")?);
    let cmd = CmdAuth::new(
        TableCommand::Delete(DeleteTable {
            tenant_id: tenant.tenant_id(),
            table_id,
            occurred_at: Utc::now(),
        }),
        "restaurant.tables.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Table>(uow.read(), table_id.aggregate_id(), "table")?;
    uow.execute::<Table>(table_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": table_id }), "table deleted"))
}

#[derive(Debug, Deserialize)]
struct MoveRequest {
    position: Position,
    #[serde(default)]
    dimensions: Option<Dimensions>,
}

async fn move_table(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<MoveRequest>,
) -> Result<Response, ApiError> {
    let table_id = TableId::new(parse_id(&id, "table")?);
    let cmd = CmdAuth::new(
        TableCommand::Move(MoveTable {
            tenant_id: tenant.tenant_id(),
            table_id,
            position: body.position,
            dimensions: body.dimensions,
            occurred_at: Utc::now(),
        }),
        "restaurant.tables.move",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    let table: Table = find(uow.read(), table_id.aggregate_id(), "table")?;
    let salon: Salon = find(uow.read(), table.salon_id().aggregate_id(), "salon")?;
    if !salon.floor_plan().contains(&body.position) {
        return Err(ApiError::validation(format!(
            "position ({}, {}) lies outside the floor plan ({}x{})",
            body.position.x,
            body.position.y,
            salon.floor_plan().width,
            salon.floor_plan().height
        )));
    }
    uow.execute::<Table>(table_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<Table>(uow.read(), table_id.aggregate_id(), "table")?)?))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: TableStatus,
    #[serde(default)]
    occupancy: Option<OccupancyInput>,
}

async fn change_status(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusRequest>,
) -> Result<Response, ApiError> {
    let table_id = TableId::new(parse_id(&id, "table")?);
    let cmd = CmdAuth::new(
        TableCommand::ChangeStatus(ChangeTableStatus {
            tenant_id: tenant.tenant_id(),
            table_id,
            status: body.status,
            occupancy: body.occupancy,
            occurred_at: Utc::now(),
        }),
        "restaurant.tables.status",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Table>(uow.read(), table_id.aggregate_id(), "table")?;
    uow.execute::<Table>(table_id.aggregate_id(), cmd).await?;

    let table: Table = find(uow.read(), table_id.aggregate_id(), "table")?;
    tracing::debug!(
        tenant_id = %tenant.tenant_id(),
        table = table.number(),
        status = ?table.status(),
        "table status changed"
    );
    Ok(dto::ok(to_json(&table)?))
}

#[derive(Debug, Deserialize)]
struct GroupRequest {
    table_ids: Vec<TableId>,
    main_table_id: TableId,
}

/// Join several tables of one salon under a main table.
async fn group_tables(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(body): JsonBody<GroupRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "restaurant.tables.group")?;

    let mut member_ids = body.table_ids.clone();
    member_ids.sort();
    member_ids.dedup();
    if member_ids.len() < 2 {
        return Err(ApiError::validation("at least two distinct tables are needed to form a group"));
    }
    if !member_ids.contains(&body.main_table_id) {
        return Err(ApiError::validation("the main table must be one of the grouped tables"));
    }

    let uow = rt.begin().await;
    let mut tables = Vec::with_capacity(member_ids.len());
    for id in &member_ids {
        tables.push(find::<Table>(uow.read(), id.aggregate_id(), "table")?);
    }

    let salon_id = tables[0].salon_id();
    for table in &tables {
        if table.salon_id() != salon_id {
            return Err(ApiError::invariant("grouped tables must belong to the same salon"));
        }
        if table.group().is_some() {
            return Err(ApiError::invariant(format!("table {} is already grouped", table.number())));
        }
        if table.status() == TableStatus::OutOfService {
            return Err(ApiError::invariant(format!("table {} is out of service", table.number())));
        }
    }

    let group = TableGroup {
        group_id: AggregateId::new(),
        main_table_id: body.main_table_id,
        member_ids: member_ids.clone(),
        capacity: tables
            .iter()
            .fold(0u32, |acc, t| acc.saturating_add(t.details().capacity.max)),
    };
    let now = Utc::now();
    let joins: Vec<(TableId, TableCommand)> = tables
        .iter()
        .map(|t| {
            let cmd = TableCommand::JoinGroup(JoinTableGroup {
                tenant_id: tenant.tenant_id(),
                table_id: t.id_typed(),
                group: group.clone(),
                occurred_at: now,
            });
            (t.id_typed(), cmd)
        })
        .collect();
    for (table, (_, cmd)) in tables.iter().zip(&joins) {
        table.handle(cmd)?;
    }
    for (table_id, cmd) in joins {
        uow.execute::<Table>(table_id.aggregate_id(), cmd).await?;
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        group_id = %group.group_id,
        tables = member_ids.len(),
        capacity = group.capacity,
        "tables grouped"
    );
    Ok(dto::created(to_json(&group)?))
}

/// Dissolve the whole group the table belongs to.
async fn ungroup_table(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let table_id = TableId::new(parse_id(&id, "table")?);
    authz::require(&tenant, &principal, "restaurant.tables.group")?;

    let uow = rt.begin().await;
    let table: Table = find(uow.read(), table_id.aggregate_id(), "table")?;
    let group_id = table
        .group()
        .map(|g| g.group_id)
        .ok_or_else(|| ApiError::invariant(format!("table {} is not grouped", table.number())))?;

    let now = Utc::now();
    let mut members = Vec::new();
    let mut leaves = Vec::new();
    for (_, member) in uow.read().list::<Table>() {
        if !member.group().is_some_and(|g| g.group_id == group_id) {
            continue;
        }
        let cmd = TableCommand::LeaveGroup(LeaveTableGroup {
            tenant_id: tenant.tenant_id(),
            table_id: member.id_typed(),
            occurred_at: now,
        });
        member.handle(&cmd)?;
        members.push(member.id_typed());
        leaves.push(cmd);
    }
    for (member, cmd) in members.iter().zip(leaves) {
        uow.execute::<Table>(member.aggregate_id(), cmd).await?;
    }

    tracing::info!(tenant_id = %tenant.tenant_id(), group_id = %group_id, tables = members.len(), "group dissolved");
    Ok(dto::ok_message(json!({ "group_id": group_id, "tables": members }), "group dissolved"))
}
