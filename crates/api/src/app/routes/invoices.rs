use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use gestiona_core::{AggregateId, CustomerRef};
use gestiona_documents::PrintableDocument;
use gestiona_invoicing::{
    DeliveryNote, DeliveryNoteCommand, DeliveryNoteId, DocumentLine, Invoice, InvoiceCommand,
    InvoiceDetails, InvoiceId, IssueInvoice, RegisterPayment, ReleaseNoteFromInvoice, VoidInvoice,
};
use gestiona_projects::Project;
use gestiona_templates::DocumentType;

use crate::app::dto::{self, JsonBody, ListSpec, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json, today};
use crate::app::routes::delivery_notes::resolve_due_date;
use crate::app::routes::templates::{company_block, pdf_response, template_for};
use crate::app::workflows;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/number", "/customer/name", "/customer/tax_id"],
    filters: &[
        ("status", "/status"),
        ("customer_id", "/customer/id"),
        ("project_id", "/project_id"),
        ("payment_method_id", "/payment_method_id"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invoices).post(issue_invoice))
        .route("/:id", get(get_invoice))
        .route("/:id/pagos", post(register_payment))
        .route("/:id/anular", post(void_invoice))
        .route("/:id/pdf", get(invoice_pdf))
}

fn invoice_view(invoice: &Invoice) -> Result<Value, ApiError> {
    let mut view = to_json(invoice)?;
    if let Value::Object(map) = &mut view {
        map.insert("outstanding_amount".into(), invoice.outstanding_amount().into());
    }
    Ok(view)
}

async fn list_invoices(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Invoice, _>(rt.read(), params, &LIST, invoice_view)
}

async fn get_invoice(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let invoice: Invoice = find(rt.read(), parse_id(&id, "invoice")?, "invoice")?;
    Ok(dto::ok(invoice_view(&invoice)?))
}

#[derive(Debug, Deserialize)]
struct IssueInvoiceRequest {
    customer: CustomerRef,
    #[serde(default)]
    issue_date: Option<NaiveDate>,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    lines: Vec<DocumentLine>,
    #[serde(default)]
    payment_method_id: Option<AggregateId>,
    #[serde(default)]
    project_id: Option<AggregateId>,
    #[serde(default)]
    notes: Option<String>,
}

/// Direct invoice, not backed by delivery notes.
async fn issue_invoice(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(body): JsonBody<IssueInvoiceRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "invoicing.invoices.create")?;
    let invoice_id = InvoiceId::generate();

    let uow = rt.begin().await;
    if let Some(project_id) = body.project_id {
        find::<Project>(uow.read(), project_id, "project")?;
    }
    let issue_date = body.issue_date.unwrap_or_else(today);
    let due_date = resolve_due_date(uow.read(), issue_date, body.due_date, body.payment_method_id)?;
    let number = workflows::next_number::<Invoice, _>(uow.read(), "FAC", issue_date, Invoice::number);
    uow.execute::<Invoice>(
        invoice_id.aggregate_id(),
        InvoiceCommand::IssueInvoice(IssueInvoice {
            tenant_id: tenant.tenant_id(),
            invoice_id,
            number: number.clone(),
            details: InvoiceDetails {
                customer: body.customer,
                issue_date,
                due_date,
                lines: body.lines,
                payment_method_id: body.payment_method_id,
                project_id: body.project_id,
                notes: body.notes,
            },
            delivery_note_ids: Vec::new(),
            occurred_at: Utc::now(),
        }),
    )
    .await?;

    let invoice: Invoice = find(uow.read(), invoice_id.aggregate_id(), "invoice")?;
    tracing::info!(tenant_id = %tenant.tenant_id(), invoice = %number, total = invoice.total_amount(), "invoice issued");
    Ok(dto::created(invoice_view(&invoice)?))
}

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    amount: u64,
    #[serde(default)]
    paid_on: Option<NaiveDate>,
}

async fn register_payment(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<PaymentRequest>,
) -> Result<Response, ApiError> {
    let invoice_id = InvoiceId::new(parse_id(&id, "invoice")?);
    let cmd = CmdAuth::new(
        InvoiceCommand::RegisterPayment(RegisterPayment {
            tenant_id: tenant.tenant_id(),
            invoice_id,
            amount: body.amount,
            paid_on: body.paid_on.unwrap_or_else(today),
            receipt_id: None,
            occurred_at: Utc::now(),
        }),
        "invoicing.invoices.pay",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Invoice>(uow.read(), invoice_id.aggregate_id(), "invoice")?;
    uow.execute::<Invoice>(invoice_id.aggregate_id(), cmd).await?;

    let invoice: Invoice = find(uow.read(), invoice_id.aggregate_id(), "invoice")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        invoice = %invoice.number(),
        amount = body.amount,
        outstanding = invoice.outstanding_amount(),
        "invoice payment registered"
    );
    Ok(dto::ok(invoice_view(&invoice)?))
}

/// Void the invoice and hand its delivery notes back for re-invoicing.
async fn void_invoice(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReasonRequest>,
) -> Result<Response, ApiError> {
    let invoice_id = InvoiceId::new(parse_id(&id, "invoice")?);
    let cmd = CmdAuth::new(
        InvoiceCommand::VoidInvoice(VoidInvoice {
            tenant_id: tenant.tenant_id(),
            invoice_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        "invoicing.invoices.void",
    )
    .authorize(&tenant, &principal)?;
    let now = Utc::now();

    let uow = rt.begin().await;
    let invoice: Invoice = find(uow.read(), invoice_id.aggregate_id(), "invoice")?;
    uow.execute::<Invoice>(invoice_id.aggregate_id(), cmd).await?;

    for note_id in invoice.delivery_note_ids() {
        let linked = uow
            .read()
            .get::<DeliveryNote>(*note_id)
            .is_some_and(|n| n.invoice_id() == Some(invoice_id.aggregate_id()));
        if !linked {
            continue;
        }
        uow.execute::<DeliveryNote>(
            *note_id,
            DeliveryNoteCommand::ReleaseFromInvoice(ReleaseNoteFromInvoice {
                tenant_id: tenant.tenant_id(),
                delivery_note_id: DeliveryNoteId::new(*note_id),
                invoice_id: invoice_id.aggregate_id(),
                occurred_at: now,
            }),
        )
        .await?;
    }

    tracing::info!(tenant_id = %tenant.tenant_id(), invoice = %invoice.number(), "invoice voided");
    Ok(dto::ok(invoice_view(&find::<Invoice>(
        uow.read(),
        invoice_id.aggregate_id(),
        "invoice",
    )?)?))
}

async fn invoice_pdf(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let read = rt.read();
    let invoice: Invoice = find(read, parse_id(&id, "invoice")?, "invoice")?;
    let doc = PrintableDocument::for_invoice(company_block(rt.company()), &invoice);
    pdf_response(&doc, &template_for(read, DocumentType::Invoice), invoice.number())
}
