use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use gestiona_core::AggregateId;
use gestiona_infra::read_model::ReadModels;
use gestiona_machinery::{
    ChangeMachineStatus, CreateMachine, DeleteMachine, Machine, MachineCommand, MachineDetails,
    MachineId, MachineStatus, RecordMaintenance, RecordUsage, UpdateMachine,
};
use gestiona_personnel::Employee;
use gestiona_projects::Project;

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json};
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/code", "/name", "/brand", "/model", "/plate", "/serial_number"],
    filters: &[("status", "/status"), ("kind", "/kind")],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_machines).post(create_machine))
        .route(
            "/:id",
            get(get_machine).put(update_machine).delete(delete_machine),
        )
        .route("/:id/estado", post(change_status))
        .route("/:id/usos", post(record_usage))
        .route("/:id/mantenimientos", post(record_maintenance))
}

fn ensure_unique_code(read: &ReadModels, details: &MachineDetails, except: Option<MachineId>) -> Result<(), ApiError> {
    let code = details.code.trim().to_uppercase();
    let taken = read
        .list::<Machine>()
        .iter()
        .any(|(_, m)| Some(m.id_typed()) != except && m.details().code == code);
    if taken {
        return Err(ApiError::conflict(format!("machine code '{code}' already exists")));
    }
    Ok(())
}

/// Run one machine command and answer with the machine.
async fn execute(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    rt: &TenantHandle,
    machine_id: MachineId,
    cmd: MachineCommand,
    permission: &'static str,
) -> Result<Machine, ApiError> {
    let cmd = CmdAuth::new(cmd, permission).authorize(tenant, principal)?;
    let uow = rt.begin().await;
    find::<Machine>(uow.read(), machine_id.aggregate_id(), "machine")?;
    if let MachineCommand::Update(update) = &cmd {
        ensure_unique_code(uow.read(), &update.details, Some(machine_id))?;
    }
    if let MachineCommand::RecordUsage(usage) = &cmd {
        if let Some(project_id) = usage.project_id {
            find::<Project>(uow.read(), project_id, "project")?;
        }
        if let Some(employee_id) = usage.employee_id {
            find::<Employee>(uow.read(), employee_id, "employee")?;
        }
    }
    uow.execute::<Machine>(machine_id.aggregate_id(), cmd).await?;
    find(uow.read(), machine_id.aggregate_id(), "machine")
}

async fn list_machines(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Machine, _>(rt.read(), params, &LIST, to_json)
}

async fn get_machine(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let machine: Machine = find(rt.read(), parse_id(&id, "machine")?, "machine")?;
    Ok(dto::ok(to_json(&machine)?))
}

async fn create_machine(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<MachineDetails>,
) -> Result<Response, ApiError> {
    let machine_id = MachineId::generate();
    let cmd = CmdAuth::new(
        MachineCommand::Create(CreateMachine {
            tenant_id: tenant.tenant_id(),
            machine_id,
            details,
            occurred_at: Utc::now(),
        }),
        "machinery.machines.create",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    if let MachineCommand::Create(create) = &cmd {
        ensure_unique_code(uow.read(), &create.details, None)?;
    }
    uow.execute::<Machine>(machine_id.aggregate_id(), cmd).await?;

    let machine: Machine = find(uow.read(), machine_id.aggregate_id(), "machine")?;
    tracing::info!(tenant_id = %tenant.tenant_id(), machine_id = %machine_id, code = %machine.details().code, "machine created");
    Ok(dto::created(to_json(&machine)?))
}

async fn update_machine(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<MachineDetails>,
) -> Result<Response, ApiError> {
    let machine_id = MachineId::new(parse_id(&id, "machine")?);
    let cmd = MachineCommand::Update(UpdateMachine {
        tenant_id: tenant.tenant_id(),
        machine_id,
        details,
        occurred_at: Utc::now(),
    });
    let machine = execute(&tenant, &principal, &rt, machine_id, cmd, "machinery.machines.update").await?;
    Ok(dto::ok(to_json(&machine)?))
}

async fn delete_machine(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let machine_id = MachineId::new(parse_id(&id, "machine")?);
    let cmd = CmdAuth::new(
        MachineCommand::Delete(DeleteMachine {
            tenant_id: tenant.tenant_id(),
            machine_id,
            occurred_at: Utc::now(),
        }),
        "machinery.machines.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Machine>(uow.read(), machine_id.aggregate_id(), "machine")?;
    uow.execute::<Machine>(machine_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": machine_id }), "machine deleted"))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: MachineStatus,
}

async fn change_status(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusRequest>,
) -> Result<Response, ApiError> {
    let machine_id = MachineId::new(parse_id(&id, "machine")?);
    let cmd = MachineCommand::ChangeStatus(ChangeMachineStatus {
        tenant_id: tenant.tenant_id(),
        machine_id,
        status: body.status,
        occurred_at: Utc::now(),
    });
    let machine = execute(&tenant, &principal, &rt, machine_id, cmd, "machinery.machines.status").await?;
    tracing::info!(tenant_id = %tenant.tenant_id(), machine_id = %machine_id, status = ?machine.status(), "machine status changed");
    Ok(dto::ok(to_json(&machine)?))
}

#[derive(Debug, Deserialize)]
struct UsageRequest {
    date: NaiveDate,
    /// Tenths of an hour.
    hours: u32,
    #[serde(default)]
    project_id: Option<AggregateId>,
    #[serde(default)]
    employee_id: Option<AggregateId>,
    #[serde(default)]
    notes: Option<String>,
}

async fn record_usage(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UsageRequest>,
) -> Result<Response, ApiError> {
    let machine_id = MachineId::new(parse_id(&id, "machine")?);
    let cmd = MachineCommand::RecordUsage(RecordUsage {
        tenant_id: tenant.tenant_id(),
        machine_id,
        date: body.date,
        hours: body.hours,
        project_id: body.project_id,
        employee_id: body.employee_id,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    let machine = execute(&tenant, &principal, &rt, machine_id, cmd, "machinery.machines.usage").await?;
    Ok(dto::created(to_json(&machine)?))
}

#[derive(Debug, Deserialize)]
struct MaintenanceRequest {
    date: NaiveDate,
    description: String,
    #[serde(default)]
    cost: u64,
    #[serde(default)]
    next_maintenance: Option<NaiveDate>,
}

async fn record_maintenance(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<MaintenanceRequest>,
) -> Result<Response, ApiError> {
    let machine_id = MachineId::new(parse_id(&id, "machine")?);
    let cmd = MachineCommand::RecordMaintenance(RecordMaintenance {
        tenant_id: tenant.tenant_id(),
        machine_id,
        date: body.date,
        description: body.description,
        cost: body.cost,
        next_maintenance: body.next_maintenance,
        occurred_at: Utc::now(),
    });
    let machine = execute(&tenant, &principal, &rt, machine_id, cmd, "machinery.machines.maintenance").await?;
    Ok(dto::created(to_json(&machine)?))
}
