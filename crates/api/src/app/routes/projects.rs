use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use gestiona_core::AggregateId;
use gestiona_infra::read_model::ReadModels;
use gestiona_invoicing::{DeliveryNote, DeliveryNoteStatus};
use gestiona_machinery::Machine;
use gestiona_personnel::{Employee, EmployeeStatus};
use gestiona_projects::{
    AssignEmployee, ChangeProjectStatus, CostReport, CreateProject, DeleteProject, Project,
    ProjectCommand, ProjectDetails, ProjectId, ProjectStatus, UnassignEmployee, UpdateProject,
};

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json};
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/code", "/name", "/customer/name", "/address"],
    filters: &[
        ("status", "/status"),
        ("customer_id", "/customer/id"),
        ("employee_id", "/employee_ids"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/iniciar", post(start_project))
        .route("/:id/reanudar", post(resume_project))
        .route("/:id/pausar", post(pause_project))
        .route("/:id/completar", post(complete_project))
        .route("/:id/cancelar", post(cancel_project))
        .route("/:id/personal", post(assign_employee))
        .route("/:id/personal/:employee_id", delete(unassign_employee))
        .route("/:id/costes", get(project_costs))
}

fn ensure_unique_code(read: &ReadModels, details: &ProjectDetails, except: Option<ProjectId>) -> Result<(), ApiError> {
    let code = details.code.trim().to_uppercase();
    let taken = read
        .list::<Project>()
        .iter()
        .any(|(_, p)| Some(p.id_typed()) != except && p.details().code.to_uppercase() == code);
    if taken {
        return Err(ApiError::conflict(format!("project code '{code}' already exists")));
    }
    Ok(())
}

/// Machinery and delivered-goods cost charged to `project_id`.
fn cost_report(read: &ReadModels, project: &Project) -> CostReport {
    let project_id = project.id_typed().aggregate_id();
    let machinery = read
        .list::<Machine>()
        .iter()
        .fold(0u64, |acc, (_, m)| acc.saturating_add(m.cost_for_project(project_id)));
    let delivered = read
        .list::<DeliveryNote>()
        .iter()
        .map(|(_, n)| n)
        .filter(|n| n.details().project_id == Some(project_id))
        .filter(|n| {
            matches!(
                n.status(),
                DeliveryNoteStatus::Delivered | DeliveryNoteStatus::Invoiced
            )
        })
        .fold(0u64, |acc, n| acc.saturating_add(n.totals().base));
    CostReport::new(project.details().budget, machinery, delivered)
}

async fn list_projects(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Project, _>(rt.read(), params, &LIST, to_json)
}

async fn get_project(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let project: Project = find(rt.read(), parse_id(&id, "project")?, "project")?;
    Ok(dto::ok(to_json(&project)?))
}

async fn create_project(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<ProjectDetails>,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::generate();
    let cmd = CmdAuth::new(
        ProjectCommand::Create(CreateProject {
            tenant_id: tenant.tenant_id(),
            project_id,
            details: details.clone(),
            occurred_at: Utc::now(),
        }),
        "projects.projects.create",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    ensure_unique_code(uow.read(), &details, None)?;
    uow.execute::<Project>(project_id.aggregate_id(), cmd).await?;

    let project: Project = find(uow.read(), project_id.aggregate_id(), "project")?;
    tracing::info!(tenant_id = %tenant.tenant_id(), project_id = %project_id, code = %project.details().code, "project created");
    Ok(dto::created(to_json(&project)?))
}

async fn update_project(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<ProjectDetails>,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::new(parse_id(&id, "project")?);
    let cmd = CmdAuth::new(
        ProjectCommand::Update(UpdateProject {
            tenant_id: tenant.tenant_id(),
            project_id,
            details: details.clone(),
            occurred_at: Utc::now(),
        }),
        "projects.projects.update",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Project>(uow.read(), project_id.aggregate_id(), "project")?;
    ensure_unique_code(uow.read(), &details, Some(project_id))?;
    uow.execute::<Project>(project_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<Project>(uow.read(), project_id.aggregate_id(), "project")?)?))
}

async fn delete_project(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::new(parse_id(&id, "project")?);
    let cmd = CmdAuth::new(
        ProjectCommand::Delete(DeleteProject {
            tenant_id: tenant.tenant_id(),
            project_id,
            occurred_at: Utc::now(),
        }),
        "projects.projects.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Project>(uow.read(), project_id.aggregate_id(), "project")?;
    uow.execute::<Project>(project_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": project_id }), "project deleted"))
}

async fn change_status(
    tenant: TenantContext,
    principal: PrincipalContext,
    rt: TenantHandle,
    id: String,
    status: ProjectStatus,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::new(parse_id(&id, "project")?);
    let cmd = CmdAuth::new(
        ProjectCommand::ChangeStatus(ChangeProjectStatus {
            tenant_id: tenant.tenant_id(),
            project_id,
            status,
            occurred_at: Utc::now(),
        }),
        "projects.projects.status",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Project>(uow.read(), project_id.aggregate_id(), "project")?;
    uow.execute::<Project>(project_id.aggregate_id(), cmd).await?;
    tracing::info!(tenant_id = %tenant.tenant_id(), project_id = %project_id, status = ?status, "project status changed");
    Ok(dto::ok(to_json(&find::<Project>(uow.read(), project_id.aggregate_id(), "project")?)?))
}

macro_rules! status_route {
    ($name:ident, $status:expr) => {
        async fn $name(
            Extension(tenant): Extension<TenantContext>,
            Extension(principal): Extension<PrincipalContext>,
            Extension(rt): Extension<TenantHandle>,
            Path(id): Path<String>,
        ) -> Result<Response, ApiError> {
            change_status(tenant, principal, rt, id, $status).await
        }
    };
}

status_route!(start_project, ProjectStatus::Active);
status_route!(resume_project, ProjectStatus::Active);
status_route!(pause_project, ProjectStatus::Paused);
status_route!(complete_project, ProjectStatus::Completed);
status_route!(cancel_project, ProjectStatus::Cancelled);

#[derive(Debug, Deserialize)]
struct AssignRequest {
    employee_id: AggregateId,
}

async fn assign_employee(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<AssignRequest>,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::new(parse_id(&id, "project")?);
    crate::authz::require(&tenant, &principal, "projects.projects.staff")?;

    let uow = rt.begin().await;
    find::<Project>(uow.read(), project_id.aggregate_id(), "project")?;
    let employee: Employee = find(uow.read(), body.employee_id, "employee")?;
    uow.execute::<Project>(
        project_id.aggregate_id(),
        ProjectCommand::AssignEmployee(AssignEmployee {
            tenant_id: tenant.tenant_id(),
            project_id,
            employee_id: body.employee_id,
            employee_terminated: employee.status() == EmployeeStatus::Terminated,
            occurred_at: Utc::now(),
        }),
    )
    .await?;
    Ok(dto::ok(to_json(&find::<Project>(uow.read(), project_id.aggregate_id(), "project")?)?))
}

async fn unassign_employee(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path((id, employee_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let project_id = ProjectId::new(parse_id(&id, "project")?);
    let cmd = CmdAuth::new(
        ProjectCommand::UnassignEmployee(UnassignEmployee {
            tenant_id: tenant.tenant_id(),
            project_id,
            employee_id: parse_id(&employee_id, "employee")?,
            occurred_at: Utc::now(),
        }),
        "projects.projects.staff",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Project>(uow.read(), project_id.aggregate_id(), "project")?;
    uow.execute::<Project>(project_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<Project>(uow.read(), project_id.aggregate_id(), "project")?)?))
}

async fn project_costs(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let read = rt.read();
    let project: Project = find(read, parse_id(&id, "project")?, "project")?;
    let report = cost_report(read, &project);
    let mut view = to_json(&report)?;
    if let Value::Object(map) = &mut view {
        map.insert("project_id".into(), json!(project.id_typed()));
        map.insert("over_budget".into(), report.over_budget().into());
    }
    Ok(dto::ok(view))
}
