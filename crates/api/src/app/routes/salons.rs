use std::collections::{BTreeMap, HashMap};

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use gestiona_core::Lifecycle;
use gestiona_infra::read_model::ReadModels;
use gestiona_restaurant::{
    CreateSalon, DeleteSalon, Dimensions, FloorPlan, MoveTable, Position, Salon, SalonCommand,
    SalonDetails, SalonId, SetSalonActive, Table, TableCommand, TableId, UpdateSalon,
};

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/name", "/description"],
    filters: &[("active", "/active"), ("warehouse_id", "/warehouse_id")],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_salons).post(create_salon))
        .route("/:id", get(get_salon).put(update_salon).delete(delete_salon))
        .route("/:id/activar", post(activate_salon))
        .route("/:id/desactivar", post(deactivate_salon))
        .route("/:id/mesas", get(salon_tables))
        .route("/:id/plano", put(save_floor_plan))
        .route("/:id/resumen", get(salon_summary))
}

/// Live tables of `salon`, by number.
pub(crate) fn tables_of(read: &ReadModels, salon: SalonId) -> Vec<Table> {
    let mut tables: Vec<Table> = read
        .list::<Table>()
        .into_iter()
        .map(|(_, t)| t)
        .filter(|t| t.salon_id() == salon)
        .collect();
    tables.sort_by_key(|t| t.number());
    tables
}

fn salon_view(salon: &Salon, tables: &[Table]) -> Result<Value, ApiError> {
    let own = tables.iter().filter(|t| t.salon_id() == salon.id_typed());
    let (count, capacity) = own.fold((0usize, 0u64), |(n, c), t| {
        (n + 1, c.saturating_add(u64::from(t.details().capacity.max)))
    });
    let mut view = to_json(salon)?;
    if let Value::Object(map) = &mut view {
        map.insert("table_count".into(), count.into());
        map.insert("total_capacity".into(), capacity.into());
    }
    Ok(view)
}

fn ensure_unique_name(read: &ReadModels, name: &str, except: Option<SalonId>) -> Result<(), ApiError> {
    let wanted = name.trim().to_lowercase();
    let taken = read
        .list::<Salon>()
        .iter()
        .any(|(_, s)| Some(s.id_typed()) != except && s.name().trim().to_lowercase() == wanted);
    if taken {
        return Err(ApiError::conflict(format!("a salon named '{}' already exists", name.trim())));
    }
    Ok(())
}

async fn list_salons(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let read = rt.read();
    let tables: Vec<Table> = read.list::<Table>().into_iter().map(|(_, t)| t).collect();
    list_response::<Salon, _>(read, params, &LIST, |s| salon_view(s, &tables))
}

async fn get_salon(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let read = rt.read();
    let salon: Salon = find(read, parse_id(&id, "salon")?, "salon")?;
    let tables = tables_of(read, salon.id_typed());
    Ok(dto::ok(salon_view(&salon, &tables)?))
}

async fn create_salon(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<SalonDetails>,
) -> Result<Response, ApiError> {
    let salon_id = SalonId::generate();
    let cmd = CmdAuth::new(
        SalonCommand::Create(CreateSalon {
            tenant_id: tenant.tenant_id(),
            salon_id,
            details,
            occurred_at: Utc::now(),
        }),
        "restaurant.salons.create",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    if let SalonCommand::Create(c) = &cmd {
        ensure_unique_name(uow.read(), &c.details.name, None)?;
    }
    uow.execute::<Salon>(salon_id.aggregate_id(), cmd).await?;

    let salon: Salon = find(uow.read(), salon_id.aggregate_id(), "salon")?;
    tracing::info!(tenant_id = %tenant.tenant_id(), salon_id = %salon_id, name = %salon.name(), "salon created");
    Ok(dto::created(salon_view(&salon, &[])?))
}

async fn update_salon(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<SalonDetails>,
) -> Result<Response, ApiError> {
    let salon_id = SalonId::new(parse_id(&id, "salon")?);
    authz::require(&tenant, &principal, "restaurant.salons.update")?;

    let uow = rt.begin().await;
    find::<Salon>(uow.read(), salon_id.aggregate_id(), "salon")?;
    ensure_unique_name(uow.read(), &details.name, Some(salon_id))?;
    uow.execute::<Salon>(
        salon_id.aggregate_id(),
        SalonCommand::Update(UpdateSalon {
            tenant_id: tenant.tenant_id(),
            salon_id,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    let salon: Salon = find(uow.read(), salon_id.aggregate_id(), "salon")?;
    let tables = tables_of(uow.read(), salon_id);
    Ok(dto::ok(salon_view(&salon, &tables)?))
}

async fn delete_salon(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let salon_id = SalonId::new(parse_id(&id, "salon")?);
    authz::require(&tenant, &principal, "restaurant.salons.delete")?;

    let uow = rt.begin().await;
    find::<Salon>(uow.read(), salon_id.aggregate_id(), "salon")?;
    let remaining_tables = tables_of(uow.read(), salon_id).len();
    uow.execute::<Salon>(
        salon_id.aggregate_id(),
        SalonCommand::Delete(DeleteSalon {
            tenant_id: tenant.tenant_id(),
            salon_id,
            remaining_tables,
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    tracing::info!(tenant_id = %tenant.tenant_id(), salon_id = %salon_id, "salon deleted");
    Ok(dto::ok_message(json!({ "id": salon_id }), "salon deleted"))
}

async fn set_active(
    tenant: TenantContext,
    principal: PrincipalContext,
    rt: TenantHandle,
    id: String,
    active: bool,
) -> Result<Response, ApiError> {
    let salon_id = SalonId::new(parse_id(&id, "salon")?);
    let cmd = CmdAuth::new(
        SalonCommand::SetActive(SetSalonActive {
            tenant_id: tenant.tenant_id(),
            salon_id,
            active,
            occurred_at: Utc::now(),
        }),
        "restaurant.salons.activate",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Salon>(uow.read(), salon_id.aggregate_id(), "salon")?;
    uow.execute::<Salon>(salon_id.aggregate_id(), cmd).await?;
    let salon: Salon = find(uow.read(), salon_id.aggregate_id(), "salon")?;
    let tables = tables_of(uow.read(), salon_id);
    Ok(dto::ok(salon_view(&salon, &tables)?))
}

async fn activate_salon(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_active(tenant, principal, rt, id, true).await
}

async fn deactivate_salon(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_active(tenant, principal, rt, id, false).await
}

async fn salon_tables(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let read = rt.read();
    let salon: Salon = find(read, parse_id(&id, "salon")?, "salon")?;
    let tables = tables_of(read, salon.id_typed())
        .iter()
        .map(to_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dto::ok(tables))
}

async fn salon_summary(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let read = rt.read();
    let salon: Salon = find(read, parse_id(&id, "salon")?, "salon")?;
    let tables = tables_of(read, salon.id_typed());

    let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut guests = 0u32;
    for table in &tables {
        *by_status.entry(table.status().as_str()).or_default() += 1;
        guests += table.occupancy().map(|o| o.guests).unwrap_or(0);
    }

    Ok(dto::ok(json!({
        "salon": salon_view(&salon, &tables)?,
        "by_status": by_status,
        "seated_guests": guests,
    })))
}

#[derive(Debug, Deserialize)]
struct PlacedTable {
    table_id: TableId,
    position: Position,
    #[serde(default)]
    dimensions: Option<Dimensions>,
}

#[derive(Debug, Deserialize)]
struct FloorPlanRequest {
    #[serde(default)]
    floor_plan: Option<FloorPlan>,
    tables: Vec<PlacedTable>,
}

/// Save the editor layout: optional new canvas plus every table's placement.
///
/// The whole request is validated before the first command runs.
async fn save_floor_plan(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<FloorPlanRequest>,
) -> Result<Response, ApiError> {
    let salon_id = SalonId::new(parse_id(&id, "salon")?);
    authz::require(&tenant, &principal, "restaurant.salons.layout")?;

    let uow = rt.begin().await;
    let salon: Salon = find(uow.read(), salon_id.aggregate_id(), "salon")?;
    let plan = body.floor_plan.clone().unwrap_or_else(|| salon.floor_plan().clone());

    for placed in &body.tables {
        let table = uow
            .read()
            .get::<Table>(placed.table_id.aggregate_id())
            .ok_or_else(|| ApiError::not_found("table"))?;
        if table.salon_id() != salon_id {
            return Err(ApiError::validation(format!(
                "table {} does not belong to salon '{}'",
                table.number(),
                salon.name()
            )));
        }
        if !plan.contains(&placed.position) {
            return Err(ApiError::validation(format!(
                "table {} lies outside the floor plan ({}x{})",
                table.number(),
                plan.width,
                plan.height
            )));
        }
    }

    let now = Utc::now();
    if let Some(floor_plan) = body.floor_plan {
        uow.execute::<Salon>(
            salon_id.aggregate_id(),
            SalonCommand::Update(UpdateSalon {
                tenant_id: tenant.tenant_id(),
                salon_id,
                details: SalonDetails {
                    floor_plan,
                    ..salon.details().clone()
                },
                occurred_at: now,
            }),
        )
        .await?;
    }

    let mut moved = 0;
    for placed in body.tables {
        let committed = uow
            .execute::<Table>(
                placed.table_id.aggregate_id(),
                TableCommand::Move(MoveTable {
                    tenant_id: tenant.tenant_id(),
                    table_id: placed.table_id,
                    position: placed.position,
                    dimensions: placed.dimensions,
                    occurred_at: now,
                }),
            )
            .await?;
        moved += committed.len();
    }

    tracing::info!(tenant_id = %tenant.tenant_id(), salon_id = %salon_id, moved, "floor plan saved");
    let salon: Salon = find(uow.read(), salon_id.aggregate_id(), "salon")?;
    let tables = tables_of(uow.read(), salon_id);
    Ok(dto::ok_message(
        json!({
            "salon": salon_view(&salon, &tables)?,
            "tables": tables.iter().map(to_json).collect::<Result<Vec<_>, _>>()?,
        }),
        format!("{moved} table(s) moved"),
    ))
}
