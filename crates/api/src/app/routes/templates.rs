use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use gestiona_documents::{CompanyBlock, PrintableDocument, render_pdf};
use gestiona_infra::read_model::ReadModels;
use gestiona_infra::tenancy::CompanyProfile;
use gestiona_templates::{
    CreateTemplate, DeleteTemplate, DocumentTemplate, DocumentType, SetDefaultTemplate,
    TemplateCommand, TemplateDetails, TemplateId, UpdateTemplate,
};

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json, today};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/name", "/description"],
    filters: &[
        ("document_type", "/document_type"),
        ("active", "/active"),
        ("is_default", "/is_default"),
        ("is_system", "/is_system"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/predeterminada/:tipo", get(default_template))
        .route(
            "/:id",
            get(get_template).put(update_template).delete(delete_template),
        )
        .route("/:id/duplicar", post(duplicate_template))
        .route("/:id/predeterminada", post(make_default))
        .route("/:id/vista-previa", get(preview_template))
}

/// The tenant's default template for `document_type`, or the built-in layout.
pub(crate) fn template_for(read: &ReadModels, document_type: DocumentType) -> TemplateDetails {
    read.list::<DocumentTemplate>()
        .into_iter()
        .map(|(_, t)| t)
        .find(|t| t.document_type() == document_type && t.is_default())
        .map(|t| t.details().clone())
        .unwrap_or_else(|| TemplateDetails::builtin(document_type))
}

pub(crate) fn company_block(company: &CompanyProfile) -> CompanyBlock {
    CompanyBlock {
        legal_name: company.legal_name.clone(),
        tax_id: company.tax_id.clone(),
        address: company.address.clone(),
        iban: company.iban.clone(),
    }
}

/// Render `doc` and serve it inline as `{filename}.pdf`.
pub(crate) fn pdf_response(
    doc: &PrintableDocument,
    template: &TemplateDetails,
    filename: &str,
) -> Result<Response, ApiError> {
    let bytes = render_pdf(doc, template)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}.pdf\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn list_templates(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<DocumentTemplate, _>(rt.read(), params, &LIST, to_json)
}

async fn get_template(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let template: DocumentTemplate = find(rt.read(), parse_id(&id, "template")?, "template")?;
    Ok(dto::ok(to_json(&template)?))
}

async fn default_template(
    Extension(rt): Extension<TenantHandle>,
    Path(tipo): Path<String>,
) -> Result<Response, ApiError> {
    let document_type = DocumentType::parse(&tipo)?;
    let stored = rt
        .read()
        .list::<DocumentTemplate>()
        .into_iter()
        .map(|(_, t)| t)
        .find(|t| t.document_type() == document_type && t.is_default());
    match stored {
        Some(template) => Ok(dto::ok(to_json(&template)?)),
        None => Ok(dto::ok_message(
            json!({ "id": null, "builtin": true, "details": TemplateDetails::builtin(document_type) }),
            "no default template configured; using the built-in layout",
        )),
    }
}

#[derive(Debug, Deserialize)]
struct CreateTemplateRequest {
    #[serde(flatten)]
    details: TemplateDetails,
    #[serde(default)]
    is_default: bool,
}

async fn create_template(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(body): JsonBody<CreateTemplateRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "templates.templates.create")?;
    if body.is_default {
        authz::require(&tenant, &principal, "templates.templates.default")?;
    }
    let template_id = TemplateId::generate();
    let document_type = body.details.document_type;

    let uow = rt.begin().await;
    uow.execute::<DocumentTemplate>(
        template_id.aggregate_id(),
        TemplateCommand::Create(CreateTemplate {
            tenant_id: tenant.tenant_id(),
            template_id,
            details: body.details,
            is_system: false,
            occurred_at: Utc::now(),
        }),
    )
    .await?;
    if body.is_default {
        set_default(&uow, &tenant, template_id, document_type).await?;
    }

    let template: DocumentTemplate = find(uow.read(), template_id.aggregate_id(), "template")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        template_id = %template_id,
        document_type = document_type.as_str(),
        "template created"
    );
    Ok(dto::created(to_json(&template)?))
}

async fn update_template(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<TemplateDetails>,
) -> Result<Response, ApiError> {
    let template_id = TemplateId::new(parse_id(&id, "template")?);
    let cmd = CmdAuth::new(
        TemplateCommand::Update(UpdateTemplate {
            tenant_id: tenant.tenant_id(),
            template_id,
            details,
            occurred_at: Utc::now(),
        }),
        "templates.templates.update",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<DocumentTemplate>(uow.read(), template_id.aggregate_id(), "template")?;
    uow.execute::<DocumentTemplate>(template_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<DocumentTemplate>(
        uow.read(),
        template_id.aggregate_id(),
        "template",
    )?)?))
}

async fn delete_template(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let template_id = TemplateId::new(parse_id(&id, "template")?);
    let cmd = CmdAuth::new(
        TemplateCommand::Delete(DeleteTemplate {
            tenant_id: tenant.tenant_id(),
            template_id,
            occurred_at: Utc::now(),
        }),
        "templates.templates.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<DocumentTemplate>(uow.read(), template_id.aggregate_id(), "template")?;
    uow.execute::<DocumentTemplate>(template_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": template_id }), "template deleted"))
}

async fn duplicate_template(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let source_id = parse_id(&id, "template")?;
    authz::require(&tenant, &principal, "templates.templates.create")?;

    let uow = rt.begin().await;
    let source: DocumentTemplate = find(uow.read(), source_id, "template")?;
    let template_id = TemplateId::generate();
    uow.execute::<DocumentTemplate>(
        template_id.aggregate_id(),
        TemplateCommand::Create(CreateTemplate {
            tenant_id: tenant.tenant_id(),
            template_id,
            details: source.duplicate_details(),
            is_system: false,
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    let copy: DocumentTemplate = find(uow.read(), template_id.aggregate_id(), "template")?;
    Ok(dto::created(to_json(&copy)?))
}

/// Make `template_id` the default of its type, clearing the previous default.
async fn set_default(
    uow: &gestiona_infra::tenancy::UnitOfWork<'_>,
    tenant: &TenantContext,
    template_id: TemplateId,
    document_type: DocumentType,
) -> Result<(), ApiError> {
    let now = Utc::now();
    let previous: Vec<TemplateId> = uow
        .read()
        .list::<DocumentTemplate>()
        .into_iter()
        .map(|(_, t)| t)
        .filter(|t| t.document_type() == document_type && t.is_default() && t.id_typed() != template_id)
        .map(|t| t.id_typed())
        .collect();

    // Validate the new default before touching the old one.
    let target: DocumentTemplate = find(uow.read(), template_id.aggregate_id(), "template")?;
    if !target.details().active {
        return Err(ApiError::invariant("an inactive template cannot be the default"));
    }

    for old in previous {
        uow.execute::<DocumentTemplate>(
            old.aggregate_id(),
            TemplateCommand::SetDefault(SetDefaultTemplate {
                tenant_id: tenant.tenant_id(),
                template_id: old,
                is_default: false,
                occurred_at: now,
            }),
        )
        .await?;
    }
    uow.execute::<DocumentTemplate>(
        template_id.aggregate_id(),
        TemplateCommand::SetDefault(SetDefaultTemplate {
            tenant_id: tenant.tenant_id(),
            template_id,
            is_default: true,
            occurred_at: now,
        }),
    )
    .await?;
    Ok(())
}

async fn make_default(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let template_id = TemplateId::new(parse_id(&id, "template")?);
    authz::require(&tenant, &principal, "templates.templates.default")?;

    let uow = rt.begin().await;
    let template: DocumentTemplate = find(uow.read(), template_id.aggregate_id(), "template")?;
    set_default(&uow, &tenant, template_id, template.document_type()).await?;

    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        template_id = %template_id,
        document_type = template.document_type().as_str(),
        "default template changed"
    );
    Ok(dto::ok(to_json(&find::<DocumentTemplate>(
        uow.read(),
        template_id.aggregate_id(),
        "template",
    )?)?))
}

/// Sample document printed with the template.
async fn preview_template(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let template: DocumentTemplate = find(rt.read(), parse_id(&id, "template")?, "template")?;
    let doc = PrintableDocument::sample(template.document_type(), company_block(rt.company()), today());
    pdf_response(&doc, template.details(), &format!("vista-previa-{}", template.document_type().as_str()))
}
