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

use gestiona_infra::read_model::ReadModels;
use gestiona_infra::tenancy::UnitOfWork;
use gestiona_treasury::{
    CreatePaymentMethod, DeletePaymentMethod, PaymentMethod, PaymentMethodCommand,
    PaymentMethodDetails, PaymentMethodId, SetPaymentMethodActive, UpdatePaymentMethod,
};

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json, today};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/code", "/name", "/notes"],
    filters: &[
        ("kind", "/kind"),
        ("active", "/active"),
        ("is_default", "/is_default"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_methods).post(create_method))
        .route("/:id", get(get_method).put(update_method).delete(delete_method))
        .route("/:id/activar", post(activate_method))
        .route("/:id/desactivar", post(deactivate_method))
        .route("/:id/vencimientos", get(due_dates))
}

fn ensure_unique_code(read: &ReadModels, code: &str, except: Option<PaymentMethodId>) -> Result<(), ApiError> {
    let wanted = code.trim().to_uppercase();
    let taken = read
        .list::<PaymentMethod>()
        .iter()
        .any(|(_, m)| Some(m.id_typed()) != except && m.code() == wanted);
    if taken {
        return Err(ApiError::conflict(format!("payment method code '{wanted}' already exists")));
    }
    Ok(())
}

/// Clear the default flag of every other method.
async fn clear_other_defaults(
    uow: &UnitOfWork<'_>,
    tenant: &TenantContext,
    keep: PaymentMethodId,
) -> Result<(), ApiError> {
    let others: Vec<PaymentMethod> = uow
        .read()
        .list::<PaymentMethod>()
        .into_iter()
        .map(|(_, m)| m)
        .filter(|m| m.id_typed() != keep && m.details().is_default)
        .collect();
    for other in others {
        uow.execute::<PaymentMethod>(
            other.id_typed().aggregate_id(),
            PaymentMethodCommand::Update(UpdatePaymentMethod {
                tenant_id: tenant.tenant_id(),
                payment_method_id: other.id_typed(),
                details: PaymentMethodDetails {
                    is_default: false,
                    ..other.details().clone()
                },
                occurred_at: Utc::now(),
            }),
        )
        .await?;
    }
    Ok(())
}

async fn list_methods(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<PaymentMethod, _>(rt.read(), params, &LIST, to_json)
}

async fn get_method(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let method: PaymentMethod = find(rt.read(), parse_id(&id, "payment method")?, "payment method")?;
    Ok(dto::ok(to_json(&method)?))
}

async fn create_method(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<PaymentMethodDetails>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "treasury.payment_methods.create")?;
    let method_id = PaymentMethodId::generate();
    let is_default = details.is_default;

    let uow = rt.begin().await;
    ensure_unique_code(uow.read(), &details.code, None)?;
    uow.execute::<PaymentMethod>(
        method_id.aggregate_id(),
        PaymentMethodCommand::Create(CreatePaymentMethod {
            tenant_id: tenant.tenant_id(),
            payment_method_id: method_id,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;
    if is_default {
        clear_other_defaults(&uow, &tenant, method_id).await?;
    }

    let method: PaymentMethod = find(uow.read(), method_id.aggregate_id(), "payment method")?;
    tracing::info!(tenant_id = %tenant.tenant_id(), code = %method.code(), "payment method created");
    Ok(dto::created(to_json(&method)?))
}

async fn update_method(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<PaymentMethodDetails>,
) -> Result<Response, ApiError> {
    let method_id = PaymentMethodId::new(parse_id(&id, "payment method")?);
    authz::require(&tenant, &principal, "treasury.payment_methods.update")?;
    let is_default = details.is_default;

    let uow = rt.begin().await;
    find::<PaymentMethod>(uow.read(), method_id.aggregate_id(), "payment method")?;
    ensure_unique_code(uow.read(), &details.code, Some(method_id))?;
    uow.execute::<PaymentMethod>(
        method_id.aggregate_id(),
        PaymentMethodCommand::Update(UpdatePaymentMethod {
            tenant_id: tenant.tenant_id(),
            payment_method_id: method_id,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;
    if is_default {
        clear_other_defaults(&uow, &tenant, method_id).await?;
    }

    Ok(dto::ok(to_json(&find::<PaymentMethod>(
        uow.read(),
        method_id.aggregate_id(),
        "payment method",
    )?)?))
}

async fn delete_method(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let method_id = PaymentMethodId::new(parse_id(&id, "payment method")?);
    let cmd = CmdAuth::new(
        PaymentMethodCommand::Delete(DeletePaymentMethod {
            tenant_id: tenant.tenant_id(),
            payment_method_id: method_id,
            occurred_at: Utc::now(),
        }),
        "treasury.payment_methods.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<PaymentMethod>(uow.read(), method_id.aggregate_id(), "payment method")?;
    uow.execute::<PaymentMethod>(method_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": method_id }), "payment method deleted"))
}

async fn set_active(
    tenant: TenantContext,
    principal: PrincipalContext,
    rt: TenantHandle,
    id: String,
    active: bool,
) -> Result<Response, ApiError> {
    let method_id = PaymentMethodId::new(parse_id(&id, "payment method")?);
    let cmd = CmdAuth::new(
        PaymentMethodCommand::SetActive(SetPaymentMethodActive {
            tenant_id: tenant.tenant_id(),
            payment_method_id: method_id,
            active,
            occurred_at: Utc::now(),
        }),
        "treasury.payment_methods.activate",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<PaymentMethod>(uow.read(), method_id.aggregate_id(), "payment method")?;
    uow.execute::<PaymentMethod>(method_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<PaymentMethod>(
        uow.read(),
        method_id.aggregate_id(),
        "payment method",
    )?)?))
}

async fn activate_method(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_active(tenant, principal, rt, id, true).await
}

async fn deactivate_method(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_active(tenant, principal, rt, id, false).await
}

#[derive(Debug, Deserialize)]
struct ScheduleQuery {
    amount: u64,
    #[serde(default)]
    issue_date: Option<NaiveDate>,
}

/// Due dates and amounts for `amount` issued on `issue_date` (today by default).
async fn due_dates(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Response, ApiError> {
    let method: PaymentMethod = find(rt.read(), parse_id(&id, "payment method")?, "payment method")?;
    let issue_date = query.issue_date.unwrap_or_else(today);
    Ok(dto::ok(json!({
        "payment_method_id": method.id_typed(),
        "amount": query.amount,
        "issue_date": issue_date,
        "installments": method.schedule(query.amount, issue_date),
    })))
}
