use std::collections::HashMap;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use gestiona_core::AggregateId;
use gestiona_infra::read_model::ReadModels;
use gestiona_infra::tenancy::UnitOfWork;
use gestiona_invoicing::Invoice;
use gestiona_treasury::{
    CancelReceipt, DueInstallment, IssueReceipt, Mandate, MarkReceiptSent, PaymentMethod, Receipt,
    ReceiptCommand, ReceiptDetails, ReceiptId, ReceiptStatus, UpdateReceipt,
};

use crate::app::dto::{self, DateRequest, JsonBody, ListQuery, ListSpec, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{CmdAuth, find, list_response, parse_id, to_json, today};
use crate::app::workflows;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/number", "/customer/name", "/concept"],
    filters: &[
        ("status", "/status"),
        ("invoice_id", "/invoice_id"),
        ("remittance_id", "/remittance_id"),
        ("customer_id", "/customer/id"),
        ("payment_method_id", "/payment_method_id"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_receipts).post(issue_receipt))
        .route("/remesables", get(remittable_receipts))
        .route("/desde-factura/:invoice_id", post(receipts_from_invoice))
        .route("/:id", get(get_receipt).put(update_receipt))
        .route("/:id/enviar", post(send_receipt))
        .route("/:id/cobrar", post(collect_receipt))
        .route("/:id/devolver", post(return_receipt))
        .route("/:id/anular", post(cancel_receipt))
}

/// Issue one receipt with the next `REC` number.
async fn issue(
    uow: &UnitOfWork<'_>,
    tenant: &TenantContext,
    details: ReceiptDetails,
) -> Result<Receipt, ApiError> {
    let receipt_id = ReceiptId::generate();
    let number = workflows::next_number::<Receipt, _>(uow.read(), "REC", details.issue_date, Receipt::number);
    uow.execute::<Receipt>(
        receipt_id.aggregate_id(),
        ReceiptCommand::Issue(IssueReceipt {
            tenant_id: tenant.tenant_id(),
            receipt_id,
            number,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;
    find(uow.read(), receipt_id.aggregate_id(), "receipt")
}

/// Amount of the invoice already covered by receipts awaiting collection.
fn pending_receipts_amount(read: &ReadModels, invoice_id: AggregateId) -> u64 {
    read.list::<Receipt>()
        .iter()
        .filter(|(_, r)| r.invoice_id() == Some(invoice_id))
        .filter(|(_, r)| {
            matches!(
                r.status(),
                ReceiptStatus::Issued | ReceiptStatus::Sent | ReceiptStatus::Returned
            )
        })
        .map(|(_, r)| r.amount())
        .sum()
}

fn ensure_invoice_exists(read: &ReadModels, details: &ReceiptDetails) -> Result<(), ApiError> {
    if let Some(invoice_id) = details.invoice_id {
        find::<Invoice>(read, invoice_id, "invoice")?;
    }
    Ok(())
}

async fn list_receipts(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Receipt, _>(rt.read(), params, &LIST, to_json)
}

/// Receipts that can go into a new remittance.
async fn remittable_receipts(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let query = ListQuery::parse(params)?;
    let items = rt
        .read()
        .list::<Receipt>()
        .iter()
        .map(|(_, r)| r)
        .filter(|r| r.is_remittable())
        .map(to_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dto::paginated(query.apply(&LIST, items)?))
}

async fn get_receipt(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let receipt: Receipt = find(rt.read(), parse_id(&id, "receipt")?, "receipt")?;
    Ok(dto::ok(to_json(&receipt)?))
}

async fn issue_receipt(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(details): JsonBody<ReceiptDetails>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "treasury.receipts.create")?;

    let uow = rt.begin().await;
    ensure_invoice_exists(uow.read(), &details)?;
    let receipt = issue(&uow, &tenant, details).await?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        receipt = %receipt.number(),
        amount = receipt.amount(),
        "receipt issued"
    );
    Ok(dto::created(to_json(&receipt)?))
}

async fn update_receipt(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<ReceiptDetails>,
) -> Result<Response, ApiError> {
    let receipt_id = ReceiptId::new(parse_id(&id, "receipt")?);
    authz::require(&tenant, &principal, "treasury.receipts.update")?;

    let uow = rt.begin().await;
    find::<Receipt>(uow.read(), receipt_id.aggregate_id(), "receipt")?;
    ensure_invoice_exists(uow.read(), &details)?;
    uow.execute::<Receipt>(
        receipt_id.aggregate_id(),
        ReceiptCommand::Update(UpdateReceipt {
            tenant_id: tenant.tenant_id(),
            receipt_id,
            details,
            occurred_at: Utc::now(),
        }),
    )
    .await?;
    Ok(dto::ok(to_json(&find::<Receipt>(uow.read(), receipt_id.aggregate_id(), "receipt")?)?))
}

#[derive(Debug, Default, Deserialize)]
struct FromInvoiceRequest {
    #[serde(default)]
    debtor_iban: Option<String>,
    #[serde(default)]
    mandate: Option<Mandate>,
    #[serde(default)]
    concept: Option<String>,
}

/// One receipt per installment of what is still uncovered on the invoice.
async fn receipts_from_invoice(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(invoice_id): Path<String>,
    body: Option<JsonBody<FromInvoiceRequest>>,
) -> Result<Response, ApiError> {
    let invoice_id = parse_id(&invoice_id, "invoice")?;
    authz::require(&tenant, &principal, "treasury.receipts.create")?;
    let body = body.map(|JsonBody(b)| b).unwrap_or_default();

    let uow = rt.begin().await;
    let invoice: Invoice = find(uow.read(), invoice_id, "invoice")?;
    if !invoice.can_accept_payment() {
        return Err(ApiError::invariant(format!(
            "invoice {} does not accept payments",
            invoice.number()
        )));
    }
    let uncovered = invoice
        .outstanding_amount()
        .saturating_sub(pending_receipts_amount(uow.read(), invoice_id));
    if uncovered == 0 {
        return Err(ApiError::invariant(format!(
            "invoice {} is already covered by receipts",
            invoice.number()
        )));
    }

    let details = invoice.details();
    let method = details
        .payment_method_id
        .and_then(|id| uow.read().get::<PaymentMethod>(id));
    let installments: Vec<DueInstallment> = match &method {
        Some(method) => method.schedule(uncovered, details.issue_date),
        None => vec![DueInstallment {
            due_date: details.due_date,
            amount: uncovered,
        }],
    };
    // Small amounts can round some installments down to nothing.
    let installments: Vec<DueInstallment> =
        installments.into_iter().filter(|i| i.amount > 0).collect();

    let count = installments.len();
    let mut planned = Vec::with_capacity(count);
    for (i, installment) in installments.into_iter().enumerate() {
        let concept = body.concept.clone().unwrap_or_else(|| {
            if count > 1 {
                format!("Factura {} ({}/{})", invoice.number(), i + 1, count)
            } else {
                format!("Factura {}", invoice.number())
            }
        });
        let receipt = ReceiptDetails {
            invoice_id: Some(invoice_id),
            customer: details.customer.clone(),
            amount: installment.amount,
            issue_date: details.issue_date,
            due_date: installment.due_date,
            debtor_iban: body.debtor_iban.clone(),
            mandate: body.mandate.clone(),
            payment_method_id: details.payment_method_id,
            concept: Some(concept),
        };
        planned.push(receipt.normalized()?);
    }

    let mut issued = Vec::with_capacity(count);
    for receipt in planned {
        issued.push(to_json(&issue(&uow, &tenant, receipt).await?)?);
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        invoice = %invoice.number(),
        receipts = issued.len(),
        amount = uncovered,
        "receipts generated from invoice"
    );
    Ok(dto::created(issued))
}

async fn send_receipt(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let receipt_id = ReceiptId::new(parse_id(&id, "receipt")?);
    let cmd = CmdAuth::new(
        ReceiptCommand::MarkSent(MarkReceiptSent {
            tenant_id: tenant.tenant_id(),
            receipt_id,
            remittance_id: None,
            occurred_at: Utc::now(),
        }),
        "treasury.receipts.send",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Receipt>(uow.read(), receipt_id.aggregate_id(), "receipt")?;
    uow.execute::<Receipt>(receipt_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<Receipt>(uow.read(), receipt_id.aggregate_id(), "receipt")?)?))
}

async fn collect_receipt(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    body: Option<JsonBody<DateRequest>>,
) -> Result<Response, ApiError> {
    let receipt_id = parse_id(&id, "receipt")?;
    authz::require(&tenant, &principal, "treasury.receipts.collect")?;
    let collected_on = body.and_then(|JsonBody(b)| b.date).unwrap_or_else(today);

    let uow = rt.begin().await;
    let receipt: Receipt = find(uow.read(), receipt_id, "receipt")?;
    workflows::collect_receipt(&uow, tenant.tenant_id(), &receipt, collected_on, None, Utc::now())
        .await?;
    Ok(dto::ok(to_json(&find::<Receipt>(uow.read(), receipt_id, "receipt")?)?))
}

#[derive(Debug, Deserialize)]
struct ReturnRequest {
    reason: String,
    #[serde(default)]
    bank_fee: u64,
    #[serde(default)]
    returned_on: Option<NaiveDate>,
}

async fn return_receipt(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReturnRequest>,
) -> Result<Response, ApiError> {
    let receipt_id = parse_id(&id, "receipt")?;
    authz::require(&tenant, &principal, "treasury.receipts.return")?;

    let uow = rt.begin().await;
    let receipt: Receipt = find(uow.read(), receipt_id, "receipt")?;
    workflows::return_receipt(
        &uow,
        tenant.tenant_id(),
        &receipt,
        body.reason,
        body.bank_fee,
        body.returned_on.unwrap_or_else(today),
        Utc::now(),
    )
    .await?;
    Ok(dto::ok(to_json(&find::<Receipt>(uow.read(), receipt_id, "receipt")?)?))
}

async fn cancel_receipt(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReasonRequest>,
) -> Result<Response, ApiError> {
    let receipt_id = ReceiptId::new(parse_id(&id, "receipt")?);
    let cmd = CmdAuth::new(
        ReceiptCommand::Cancel(CancelReceipt {
            tenant_id: tenant.tenant_id(),
            receipt_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
        "treasury.receipts.cancel",
    )
    .authorize(&tenant, &principal)?;

    let uow = rt.begin().await;
    find::<Receipt>(uow.read(), receipt_id.aggregate_id(), "receipt")?;
    uow.execute::<Receipt>(receipt_id.aggregate_id(), cmd).await?;
    Ok(dto::ok(to_json(&find::<Receipt>(uow.read(), receipt_id.aggregate_id(), "receipt")?)?))
}
