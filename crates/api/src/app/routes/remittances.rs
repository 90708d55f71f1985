use std::collections::{BTreeMap, HashMap};

use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use gestiona_core::{Aggregate, AggregateId, Lifecycle};
use gestiona_infra::tenancy::UnitOfWork;
use gestiona_invoicing::Invoice;
use gestiona_treasury::{
    AssignReceiptToRemittance, CancelRemittance, CollectReceipt, CreateRemittance, MarkReceiptSent, Receipt,
    ReceiptCommand, ReceiptId, ReceiptStatus, ReleaseReceiptFromRemittance, RemittedReceipt,
    Remittance, RemittanceCommand, RemittanceId, RemittanceStatus, SendRemittance, SepaBatch,
    SepaCreditor, SepaDebit, SequenceType, SettleRemittance, pain008,
};

use crate::app::dto::{self, JsonBody, ListSpec};
use crate::app::errors::ApiError;
use crate::app::routes::common::{find, list_response, parse_id, to_json, today};
use crate::app::workflows;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext, TenantHandle};

const LIST: ListSpec = ListSpec {
    search: &["/number"],
    filters: &[
        ("status", "/status"),
        ("sequence_type", "/sequence_type"),
        ("collection_date", "/collection_date"),
    ],
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_remittances).post(create_remittance))
        .route("/:id", get(get_remittance))
        .route("/:id/enviar", post(send_remittance))
        .route("/:id/cobrar", post(settle_remittance))
        .route("/:id/anular", post(cancel_remittance))
        .route("/:id/fichero", get(sepa_file))
}

fn receipts_of(uow: &UnitOfWork<'_>, remittance: &Remittance) -> Result<Vec<Receipt>, ApiError> {
    remittance
        .receipt_ids()
        .iter()
        .map(|id| find::<Receipt>(uow.read(), id.aggregate_id(), "receipt"))
        .collect()
}

/// Run every receipt command against the current receipt state without
/// committing, so a remittance never moves while one of its receipts cannot.
fn dry_run(moves: &[(&Receipt, ReceiptCommand)]) -> Result<(), ApiError> {
    for (receipt, cmd) in moves {
        receipt.handle(cmd)?;
    }
    Ok(())
}

async fn commit_moves(uow: &UnitOfWork<'_>, moves: Vec<(&Receipt, ReceiptCommand)>) -> Result<(), ApiError> {
    for (receipt, cmd) in moves {
        uow.execute::<Receipt>(receipt.id_typed().aggregate_id(), cmd).await?;
    }
    Ok(())
}

async fn list_remittances(
    Extension(rt): Extension<TenantHandle>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    list_response::<Remittance, _>(rt.read(), params, &LIST, to_json)
}

async fn get_remittance(
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let remittance: Remittance = find(rt.read(), parse_id(&id, "remittance")?, "remittance")?;
    Ok(dto::ok(to_json(&remittance)?))
}

#[derive(Debug, Deserialize)]
struct CreateRemittanceRequest {
    receipt_ids: Vec<ReceiptId>,
    collection_date: NaiveDate,
    #[serde(default)]
    sequence_type: SequenceType,
}

/// Group remittable receipts into a draft remittance.
async fn create_remittance(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    JsonBody(body): JsonBody<CreateRemittanceRequest>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "treasury.remittances.create")?;
    let remittance_id = RemittanceId::generate();
    let now = Utc::now();

    let uow = rt.begin().await;
    let mut remitted = Vec::with_capacity(body.receipt_ids.len());
    for receipt_id in &body.receipt_ids {
        let receipt: Receipt = find(uow.read(), receipt_id.aggregate_id(), "receipt")?;
        if !receipt.is_remittable() {
            return Err(ApiError::invariant(format!(
                "receipt {} cannot be remitted (status {}, needs IBAN and mandate, no remittance)",
                receipt.number(),
                receipt.status().as_str()
            )));
        }
        remitted.push(RemittedReceipt {
            receipt_id: *receipt_id,
            amount: receipt.amount(),
        });
    }

    let number = workflows::next_number::<Remittance, _>(uow.read(), "REM", today(), Remittance::number);
    uow.execute::<Remittance>(
        remittance_id.aggregate_id(),
        RemittanceCommand::Create(CreateRemittance {
            tenant_id: tenant.tenant_id(),
            remittance_id,
            number: number.clone(),
            collection_date: body.collection_date,
            sequence_type: body.sequence_type,
            receipts: remitted,
            today: today(),
            occurred_at: now,
        }),
    )
    .await?;

    for receipt_id in &body.receipt_ids {
        uow.execute::<Receipt>(
            receipt_id.aggregate_id(),
            ReceiptCommand::AssignToRemittance(AssignReceiptToRemittance {
                tenant_id: tenant.tenant_id(),
                receipt_id: *receipt_id,
                remittance_id: remittance_id.aggregate_id(),
                occurred_at: now,
            }),
        )
        .await?;
    }

    let remittance: Remittance = find(uow.read(), remittance_id.aggregate_id(), "remittance")?;
    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        remittance = %number,
        receipts = remittance.receipt_ids().len(),
        total = remittance.total_amount(),
        "remittance created"
    );
    Ok(dto::created(to_json(&remittance)?))
}

async fn send_remittance(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let remittance_id = RemittanceId::new(parse_id(&id, "remittance")?);
    authz::require(&tenant, &principal, "treasury.remittances.send")?;
    let now = Utc::now();

    let uow = rt.begin().await;
    let remittance: Remittance = find(uow.read(), remittance_id.aggregate_id(), "remittance")?;
    let receipts = receipts_of(&uow, &remittance)?;
    let moves: Vec<(&Receipt, ReceiptCommand)> = receipts
        .iter()
        .filter(|r| r.status() != ReceiptStatus::Sent)
        .map(|r| {
            let cmd = ReceiptCommand::MarkSent(MarkReceiptSent {
                tenant_id: tenant.tenant_id(),
                receipt_id: r.id_typed(),
                remittance_id: Some(remittance_id.aggregate_id()),
                occurred_at: now,
            });
            (r, cmd)
        })
        .collect();
    let send = RemittanceCommand::Send(SendRemittance {
        tenant_id: tenant.tenant_id(),
        remittance_id,
        occurred_at: now,
    });
    remittance.handle(&send)?;
    dry_run(&moves)?;

    uow.execute::<Remittance>(remittance_id.aggregate_id(), send).await?;
    commit_moves(&uow, moves).await?;

    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        remittance = %remittance.number(),
        receipts = receipts.len(),
        "remittance sent"
    );
    Ok(dto::ok(to_json(&find::<Remittance>(
        uow.read(),
        remittance_id.aggregate_id(),
        "remittance",
    )?)?))
}

/// Settle: every receipt still sent is collected on the collection date.
async fn settle_remittance(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let remittance_id = RemittanceId::new(parse_id(&id, "remittance")?);
    authz::require(&tenant, &principal, "treasury.remittances.settle")?;
    let now = Utc::now();

    let uow = rt.begin().await;
    let remittance: Remittance = find(uow.read(), remittance_id.aggregate_id(), "remittance")?;
    if remittance.status() != RemittanceStatus::Sent {
        return Err(ApiError::invariant(format!(
            "remittance {} is {}, only sent remittances can be settled",
            remittance.number(),
            remittance.status().as_str()
        )));
    }
    let pending: Vec<Receipt> = receipts_of(&uow, &remittance)?
        .into_iter()
        .filter(|r| r.status() == ReceiptStatus::Sent)
        .collect();
    let collections: Vec<(&Receipt, ReceiptCommand)> = pending
        .iter()
        .map(|r| {
            let cmd = ReceiptCommand::Collect(CollectReceipt {
                tenant_id: tenant.tenant_id(),
                receipt_id: r.id_typed(),
                collected_on: remittance.collection_date(),
                remittance_id: Some(remittance_id.aggregate_id()),
                occurred_at: now,
            });
            (r, cmd)
        })
        .collect();
    dry_run(&collections)?;

    // Every invoice must be able to take the sum of its receipts.
    let mut per_invoice: BTreeMap<AggregateId, u64> = BTreeMap::new();
    for receipt in &pending {
        if let Some(invoice_id) = receipt.invoice_id() {
            let sum = per_invoice.entry(invoice_id).or_default();
            *sum = sum
                .checked_add(receipt.amount())
                .ok_or_else(|| ApiError::validation("receipt amounts overflow"))?;
        }
    }
    for (invoice_id, amount) in &per_invoice {
        let invoice: Invoice = find(uow.read(), *invoice_id, "invoice")?;
        if !invoice.can_accept_payment() || invoice.outstanding_amount() < *amount {
            return Err(ApiError::invariant(format!(
                "invoice {} cannot take {} cents (outstanding {})",
                invoice.number(),
                amount,
                invoice.outstanding_amount()
            )));
        }
    }

    uow.execute::<Remittance>(
        remittance_id.aggregate_id(),
        RemittanceCommand::Settle(SettleRemittance {
            tenant_id: tenant.tenant_id(),
            remittance_id,
            occurred_at: now,
        }),
    )
    .await?;
    for receipt in &pending {
        workflows::collect_receipt(
            &uow,
            tenant.tenant_id(),
            receipt,
            remittance.collection_date(),
            Some(remittance_id.aggregate_id()),
            now,
        )
        .await?;
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        remittance = %remittance.number(),
        collected = pending.len(),
        "remittance settled"
    );
    Ok(dto::ok(to_json(&find::<Remittance>(
        uow.read(),
        remittance_id.aggregate_id(),
        "remittance",
    )?)?))
}

async fn cancel_remittance(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let remittance_id = RemittanceId::new(parse_id(&id, "remittance")?);
    authz::require(&tenant, &principal, "treasury.remittances.cancel")?;
    let now = Utc::now();

    let uow = rt.begin().await;
    let remittance: Remittance = find(uow.read(), remittance_id.aggregate_id(), "remittance")?;
    let receipts = receipts_of(&uow, &remittance)?;
    let releases: Vec<(&Receipt, ReceiptCommand)> = receipts
        .iter()
        .map(|r| {
            let cmd = ReceiptCommand::ReleaseFromRemittance(ReleaseReceiptFromRemittance {
                tenant_id: tenant.tenant_id(),
                receipt_id: r.id_typed(),
                occurred_at: now,
            });
            (r, cmd)
        })
        .collect();
    let cancel = RemittanceCommand::Cancel(CancelRemittance {
        tenant_id: tenant.tenant_id(),
        remittance_id,
        occurred_at: now,
    });
    remittance.handle(&cancel)?;
    dry_run(&releases)?;

    uow.execute::<Remittance>(remittance_id.aggregate_id(), cancel).await?;
    commit_moves(&uow, releases).await?;

    Ok(dto::ok(to_json(&find::<Remittance>(
        uow.read(),
        remittance_id.aggregate_id(),
        "remittance",
    )?)?))
}

/// SEPA Core direct debit file (pain.008.001.02).
async fn sepa_file(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(rt): Extension<TenantHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&tenant, &principal, "treasury.remittances.export")?;
    let read = rt.read();
    let remittance: Remittance = find(read, parse_id(&id, "remittance")?, "remittance")?;
    if remittance.status() == RemittanceStatus::Cancelled {
        return Err(ApiError::invariant("a cancelled remittance has no SEPA file"));
    }

    let mut debits = Vec::with_capacity(remittance.receipt_ids().len());
    for receipt_id in remittance.receipt_ids() {
        let receipt: Receipt = find(read, receipt_id.aggregate_id(), "receipt")?;
        let debit = receipt.details().direct_debit().ok_or_else(|| {
            ApiError::invariant(format!("receipt {} has no IBAN or mandate", receipt.number()))
        })?;
        debits.push(SepaDebit {
            end_to_end_id: receipt.number().to_string(),
            amount: receipt.amount(),
            mandate_id: debit.mandate.reference,
            mandate_signed_on: debit.mandate.signed_on,
            debtor_name: receipt.details().customer.name.clone(),
            debtor_iban: debit.iban,
            remittance_info: receipt
                .details()
                .concept
                .clone()
                .unwrap_or_else(|| format!("Recibo {}", receipt.number())),
        });
    }

    let company = rt.company();
    let creditor = SepaCreditor {
        name: company.legal_name.clone(),
        iban: company.iban.clone(),
        bic: company.bic.clone(),
        creditor_id: company.sepa_creditor_id.clone(),
    };
    let batch = SepaBatch {
        message_id: remittance.number().to_string(),
        created_at: remittance.created_at().unwrap_or_else(Utc::now),
        collection_date: remittance.collection_date(),
        sequence_type: remittance.sequence_type(),
    };
    let xml = pain008(&creditor, &batch, &debits)?;

    tracing::info!(
        tenant_id = %tenant.tenant_id(),
        remittance = %remittance.number(),
        debits = debits.len(),
        "sepa file generated"
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/xml; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.xml\"", remittance.number()),
            ),
        ],
        xml,
    )
        .into_response())
}
