use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};

use gestiona_infra::read_model::ReadModels;
use gestiona_personnel::{
    CreateEmployee, DeleteEmployee, Employee, EmployeeCommand, EmployeeDetails, EmployeeId,
    EndLeave, RehireEmployee, StartLeave, TerminateEmployee, UpdateEmployee,
};

use crate::app::dto::{self, DateRequest, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json, today};
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/code", "/first_name", "/last_name", "/tax_id", "/email"],
    filters: &[
        ("status", "/status"),
        ("department", "/department"),
        ("position", "/position"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route(
            "/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .route("/:id/baja", post(start_leave))
        .route("/:id/alta", post(end_leave))
        .route("/:id/finalizar", post(terminate))
        .route("/:id/readmitir", post(rehire))
}

fn employee_view(employee: &Employee) -> Result<Value, ApiError> {
    let mut view = to_json(employee)?;
    if let Value::Object(map) = &mut view {
        map.insert("full_name".into(), employee.details().full_name().into());
    }
    Ok(view)
}

/// Code and tax id are unique among live employees.
fn ensure_unique(read: &ReadModels, details: &EmployeeDetails, except: Option<EmployeeId>) -> Result<(), ApiError> {
    let details = details.clone().normalized()?;
    for (_, other) in read.list::<Employee>() {
        if Some(other.id_typed()) == except {
            continue;
        }
        if other.details().code == details.code {
            return Err(ApiError::conflict(format!("employee code '{}' already exists", details.code)));
        }
        if other.details().tax_id == details.tax_id {
            return Err(ApiError::conflict(format!(
                "an employee with tax id '{}' already exists",
                details.tax_id
            )));
        }
    }
    Ok(())
}

async fn list_employees(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Employee, _>(rt.read(), params, &LIST, employee_view)
}

async fn get_employee(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let employee: Employee = find(rt.read(), parse_id(&id, "employee")?, "employee")?;
    Ok(dto::ok(employee_view(&employee)?))
}

async fn create_employee(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<EmployeeDetails>,
) -> Result<Response, ApiError> {
    let employee_id = EmployeeId::generate();
    let cmd = CmdAuth::new(
        EmployeeCommand::Create(CreateEmployee {
            tenant_id: tenant.tenant_id(),
            employee_id,
            details: details.clone(),
            occurred_at: Utc::now(),
        }),
        "personnel.employees.create",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    ensure_unique(uow.read(), &details, None)?;
    uow.execute::<Employee>(employee_id.aggregate_id(), cmd).await?;

    let employee: Employee = find(uow.read(), employee_id.aggregate_id(), "employee")?;
    tracing::info!(tenant_id = %tenant.tenant_id(), employee_id = %employee_id, code = %employee.details().code, "employee created");
    Ok(dto::created(employee_view(&employee)?))
}

async fn update_employee(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<EmployeeDetails>,
) -> Result<Response, ApiError> {
    let employee_id = EmployeeId::new(parse_id(&id, "employee")?);
    let cmd = CmdAuth::new(
        EmployeeCommand::Update(UpdateEmployee {
            tenant_id: tenant.tenant_id(),
            employee_id,
            details: details.clone(),
            occurred_at: Utc::now(),
        }),
        "personnel.employees.update",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Employee>(uow.read(), employee_id.aggregate_id(), "employee")?;
    ensure_unique(uow.read(), &details, Some(employee_id))?;
    uow.execute::<Employee>(employee_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(employee_view(&find::<Employee>(
        uow.read(),
        employee_id.aggregate_id(),
        "employee",
    )?)?))
}

async fn delete_employee(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let employee_id = EmployeeId::new(parse_id(&id, "employee")?);
    let cmd = CmdAuth::new(
        EmployeeCommand::Delete(DeleteEmployee {
            tenant_id: tenant.tenant_id(),
            employee_id,
            occurred_at: Utc::now(),
        }),
        "personnel.employees.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Employee>(uow.read(), employee_id.aggregate_id(), "employee")?;
    uow.execute::<Employee>(employee_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": employee_id }), "employee deleted"))
}

/// Run a status command and answer with the updated employee.
async fn transition(
    tenant: TenantContext,
    principal: PrincipalContext,
    rt: TenantHandle,
    employee_id: EmployeeId,
    cmd: EmployeeCommand,
    permission: &'static str,
) -> Result<Response, ApiError> {
    let cmd = CmdAuth::new(cmd, permission).authorize(&tenant, &principal)?;
    let uow = rt.begin().await;
    find::<Employee>(uow.read(), employee_id.aggregate_id(), "employee")?;
    uow.execute::<Employee>(employee_id.aggregate_id(), cmd).await?;

    let employee: Employee = find(uow.read(), employee_id.aggregate_id(), "employee")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        employee_id = %employee_id,
        status = ?employee.status(),
        "employee status changed"
    );
    Ok(dto::ok(employee_view(&employee)?))
}

async fn start_leave(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let employee_id = EmployeeId::new(parse_id(&id, "employee")?);
    let cmd = EmployeeCommand::StartLeave(StartLeave {
        tenant_id: tenant.tenant_id(),
        employee_id,
        occurred_at: Utc::now(),
    });
    transition(tenant, principal, rt, employee_id, cmd, "personnel.employees.leave").await
}

async fn end_leave(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let employee_id = EmployeeId::new(parse_id(&id, "employee")?);
    let cmd = EmployeeCommand::EndLeave(EndLeave {
        tenant_id: tenant.tenant_id(),
        employee_id,
        occurred_at: Utc::now(),
    });
    transition(tenant, principal, rt, employee_id, cmd, "personnel.employees.leave").await
}

async fn terminate(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    body: Option<JsonBody<DateRequest>>,
) -> Result<Response, ApiError> {
    let employee_id = EmployeeId::new(parse_id(&id, "employee")?);
    let cmd = EmployeeCommand::Terminate(TerminateEmployee {
        tenant_id: tenant.tenant_id(),
        employee_id,
        termination_date: body.and_then(|JsonBody(b)| b.date).unwrap_or_else(today),
        occurred_at: Utc::now(),
    });
    transition(tenant, principal, rt, employee_id, cmd, "personnel.employees.terminate").await
}

async fn rehire(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    body: Option<JsonBody<DateRequest>>,
) -> Result<Response, ApiError> {
    let employee_id = EmployeeId::new(parse_id(&id, "employee")?);
    let cmd = EmployeeCommand::Rehire(RehireEmployee {
        tenant_id: tenant.tenant_id(),
        employee_id,
        hire_date: body.and_then(|JsonBody(b)| b.date),
        occurred_at: Utc::now(),
    });
    transition(tenant, principal, rt, employee_id, cmd, "personnel.employees.rehire").await
}
