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
use gestiona_documents::PrintableDocument;
use gestiona_infra::read_model::ReadModels;
use gestiona_invoicing::{
    CancelDeliveryNote, CreateDeliveryNote, DeleteDeliveryNote, DeliverNote, DeliveryNote,
    DeliveryNoteCommand, DeliveryNoteDetails, DeliveryNoteId, Invoice, InvoiceCommand,
    InvoiceDetails, InvoiceId, IssueInvoice, MarkNoteInvoiced, UpdateDeliveryNote,
    invoice_lines_from_notes,
};
use gestiona_projects::Project;
use gestiona_templates::DocumentType;
use gestiona_treasury::PaymentMethod;

use crate::app::dto::{self, JsonBody, ListSpec, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json, today};
use crate::app::routes::templates::{company_block, pdf_response, template_for};
use crate::app::workflows;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/number", "/customer/name", "/notes"],
    filters: &[
        ("status", "/status"),
        ("customer_id", "/customer/id"),
        ("project_id", "/project_id"),
        ("warehouse_id", "/warehouse_id"),
        ("invoice_id", "/invoice_id"),
        ("date", "/date"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notes).post(create_note))
        .route("/facturar", post(invoice_notes))
        .route("/:id", get(get_note).put(update_note).delete(delete_note))
        .route("/:id/entregar", post(deliver_note))
        .route("/:id/anular", post(cancel_note))
        .route("/:id/pdf", get(note_pdf))
}

fn ensure_project_exists(read: &ReadModels, details: &DeliveryNoteDetails) -> Result<(), ApiError> {
    if let Some(project_id) = details.project_id {
        find::<Project>(read, project_id, "project")?;
    }
    Ok(())
}

async fn list_notes(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<DeliveryNote, _>(rt.read(), params, &LIST, to_json)
}

async fn get_note(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let note: DeliveryNote = find(rt.read(), parse_id(&id, "delivery note")?, "delivery note")?;
    Ok(dto::ok(to_json(&note)?))
}

async fn create_note(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<DeliveryNoteDetails>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "invoicing.delivery_notes.create")?;
    let note_id = DeliveryNoteId::generate();

    let uow = rt.begin().await;
    ensure_project_exists(uow.read(), &details)?;
    let number = workflows::next_number::<DeliveryNote, _>(uow.read(), "ALB", details.date, DeliveryNote::number);
    uow.execute::<DeliveryNote>(
        note_id.aggregate_id(),
        DeliveryNoteCommand::Create(CreateDeliveryNote {
            tenant_id: tenant.tenant_id(),
            delivery_note_id: note_id,
            number: number.clone(),
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    let note: DeliveryNote = find(uow.read(), note_id.aggregate_id(), "delivery note")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        delivery_note = %number,
        total = note.totals().total,
        "delivery note created"
    );
    Ok(dto::created(to_json(&note)?))
}

async fn update_note(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<DeliveryNoteDetails>,
) -> Result<Response, ApiError> {
    let note_id = DeliveryNoteId::new(parse_id(&id, "delivery note")?);
    authz::require(&tenant, &principal, "invoicing.delivery_notes.update")?;

    let uow = rt.begin().await;
    find::<DeliveryNote>(uow.read(), note_id.aggregate_id(), "delivery note")?;
    ensure_project_exists(uow.read(), &details)?;
    uow.execute::<DeliveryNote>(
        note_id.aggregate_id(),
        DeliveryNoteCommand::Update(UpdateDeliveryNote {
            tenant_id: tenant.tenant_id(),
            delivery_note_id: note_id,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;
    Ok(dto::ok(to_json(&find::<DeliveryNote>(
        uow.read(),
        note_id.aggregate_id(),
        "delivery note",
    )?)?))
}

async fn delete_note(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let note_id = DeliveryNoteId::new(parse_id(&id, "delivery note")?);
    let cmd = CmdAuth::new(
        DeliveryNoteCommand::Delete(DeleteDeliveryNote {
            tenant_id: tenant.tenant_id(),
            delivery_note_id: note_id,
            occurred_at: Utc::now(),
        }),
        "invoicing.delivery_notes.delete",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<DeliveryNote>(uow.read(), note_id.aggregate_id(), "delivery note")?;
    uow.execute::<DeliveryNote>(note_id.aggregate_id(), cmd).await?;
    Ok(dto::ok_message(json!({ "id": note_id }), "delivery note deleted"))
}

async fn deliver_note(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let note_id = DeliveryNoteId::new(parse_id(&id, "delivery note")?);
    let cmd = CmdAuth::new(
        DeliveryNoteCommand::Deliver(DeliverNote {
            tenant_id: tenant.tenant_id(),
            delivery_note_id: note_id,
            occurred_at: Utc::now(),
        }),
        "invoicing.delivery_notes.deliver",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<DeliveryNote>(uow.read(), note_id.aggregate_id(), "delivery note")?;
    uow.execute::<DeliveryNote>(note_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<DeliveryNote>(
        uow.read(),
        note_id.aggregate_id(),
        "delivery note",
    )?)?))
}

async fn cancel_note(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReasonRequest>,
) -> Result<Response, ApiError> {
    let note_id = DeliveryNoteId::new(parse_id(&id, "delivery note")?);
    let cmd = CmdAuth::new(
        DeliveryNoteCommand::Cancel(CancelDeliveryNote {
            tenant_id: tenant.tenant_id(),
            delivery_note_id: note_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        "invoicing.delivery_notes.cancel",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<DeliveryNote>(uow.read(), note_id.aggregate_id(), "delivery note")?;
    uow.execute::<DeliveryNote>(note_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<DeliveryNote>(
        uow.read(),
        note_id.aggregate_id(),
        "delivery note",
    )?)?))
}

#[derive(Debug, Deserialize)]
struct InvoiceNotesRequest {
    delivery_note_ids: Vec<DeliveryNoteId>,
    #[serde(default)]
    issue_date: Option<NaiveDate>,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    payment_method_id: Option<AggregateId>,
    #[serde(default)]
    notes: Option<String>,
}

/// Due date of an invoice: explicit, else the last installment of its
/// payment method, else the issue date.
pub(crate) fn resolve_due_date(
    read: &ReadModels,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    payment_method_id: Option<AggregateId>,
) -> Result<NaiveDate, ApiError> {
    if let Some(method_id) = payment_method_id {
        let method: PaymentMethod = find(read, method_id, "payment method")?;
        if !method.is_active() {
            return Err(ApiError::invariant(format!(
                "payment method '{}' is inactive",
                method.code()
            )));
        }
        if due_date.is_none() {
            let last = method.schedule(1, issue_date).last().map(|i| i.due_date);
            return Ok(last.unwrap_or(issue_date));
        }
    }
    Ok(due_date.unwrap_or(issue_date))
}

/// Issue one invoice covering delivered notes of a single customer.
async fn invoice_notes(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(body): JsonBody<InvoiceNotesRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "invoicing.delivery_notes.invoice")?;
    authz::require(&tenant, &principal, "invoicing.invoices.create")?;
    let now = Utc::now();

    let uow = rt.begin().await;
    let mut notes = Vec::with_capacity(body.delivery_note_ids.len());
    for note_id in &body.delivery_note_ids {
        notes.push(find::<DeliveryNote>(uow.read(), note_id.aggregate_id(), "delivery note")?);
    }
    let refs: Vec<&DeliveryNote> = notes.iter().collect();
    let (customer, lines) = invoice_lines_from_notes(&refs)?;

    let issue_date = body.issue_date.unwrap_or_else(today);
    let due_date = resolve_due_date(uow.read(), issue_date, body.due_date, body.payment_method_id)?;
    let project_id = notes
        .first()
        .and_then(|n| n.details().project_id)
        .filter(|p| notes.iter().all(|n| n.details().project_id == Some(*p)));

    let invoice_id = InvoiceId::generate();
    let number = workflows::next_number::<Invoice, _>(uow.read(), "FAC", issue_date, Invoice::number);
    uow.execute::<Invoice>(
        invoice_id.aggregate_id(),
        InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id: tenant.tenant_id(),
            invoice_id,
            number: number.clone(),
            details: InvoiceDetails {
                customer,
                issue_date,
                due_date,
                lines,
                payment_method_id: body.payment_method_id,
                project_id,
                notes: body.notes,
            },
            delivery_note_ids: notes.iter().map(|n| n.id_typed().aggregate_id()).collect(),
            occurred_at: now,
        }),
    )
    .await?;

    for note in &notes {
        uow.execute::<DeliveryNote>(
            note.id_typed().aggregate_id(),
            DeliveryNoteCommand::MarkInvoiced(MarkNoteInvoiced {
                tenant_id: tenant.tenant_id(),
                delivery_note_id: note.id_typed(),
                invoice_id: invoice_id.aggregate_id(),
                occurred_at: now,
            }),
        )
        .await?;
    }

    let invoice: Invoice = find(uow.read(), invoice_id.aggregate_id(), "invoice")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        invoice = %number,
        delivery_notes = notes.len(),
        total = invoice.total_amount(),
        "delivery notes invoiced"
    );
    Ok(dto::created(to_json(&invoice)?))
}

async fn note_pdf(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let read = rt.read();
    let note: DeliveryNote = find(read, parse_id(&id, "delivery note")?, "delivery note")?;
    let doc = PrintableDocument::for_delivery_note(company_block(rt.company()), &note);
    pdf_response(&doc, &template_for(read, DocumentType::DeliveryNote), note.number())
}
