//! Operations that span several aggregates of one tenant.
//!
//! Every function runs inside the caller's [`UnitOfWork`], so the lookups it
//! makes cannot be invalidated by another writer of the same tenant.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use gestiona_core::{AggregateId, TenantId};
use gestiona_infra::event_store::StoredEvent;
use gestiona_infra::numbering;
use gestiona_infra::read_model::{Projected, ReadModels};
use gestiona_infra::tenancy::UnitOfWork;
use gestiona_inventory::{
    AdjustStock, AdjustmentReason, InventoryCommand, StockLevel, StockLevelId, Transfer,
    TransferEvent,
};
use gestiona_invoicing::{Invoice, InvoiceCommand, RegisterPayment, ReversePayment};
use gestiona_treasury::{
    CollectReceipt, Receipt, ReceiptCommand, ReceiptStatus, ReturnReceipt,
};

use crate::app::errors::ApiError;

/// Next `PREFIX{year}-{seq}` number among the live `A`s.
pub fn next_number<A, F>(read: &ReadModels, prefix: &str, date: NaiveDate, number: F) -> String
where
    A: Projected,
    F: Fn(&A) -> &str,
{
    let existing: Vec<String> = read
        .list::<A>()
        .iter()
        .map(|(_, a)| number(a).to_string())
        .collect();
    numbering::next_number(prefix, date.year(), existing.iter().map(String::as_str))
}

/// Stock on hand of each product of `transfer` in its origin warehouse.
pub fn origin_stock(read: &ReadModels, transfer: &Transfer) -> BTreeMap<AggregateId, i64> {
    transfer
        .lines()
        .iter()
        .map(|line| {
            let id = StockLevelId::for_product(transfer.origin_warehouse_id(), line.product_id);
            let on_hand = read
                .get::<StockLevel>(id.aggregate_id())
                .map(|level| level.on_hand())
                .unwrap_or(0);
            (line.product_id, on_hand)
        })
        .collect()
}

/// Apply the stock movements reported by freshly committed transfer events.
///
/// Shipping takes stock out of the origin, receiving puts it into the
/// destination and cancelling in transit returns it to the origin.
pub async fn apply_transfer_stock(
    uow: &UnitOfWork<'_>,
    tenant_id: TenantId,
    transfer: &Transfer,
    committed: &[StoredEvent],
    occurred_at: DateTime<Utc>,
) -> Result<usize, ApiError> {
    let mut adjustments = 0;
    for stored in committed {
        let event: TransferEvent = serde_json::from_value(stored.payload.clone())
            .map_err(|e| ApiError::Internal(format!("undecodable transfer event: {e}")))?;

        let (warehouse_id, sign, reason, quantities) = match &event {
            TransferEvent::TransferShipped(e) => (
                transfer.origin_warehouse_id(),
                -1,
                AdjustmentReason::TransferOut,
                &e.shipped,
            ),
            TransferEvent::TransferReceived(e) => (
                transfer.destination_warehouse_id(),
                1,
                AdjustmentReason::TransferIn,
                &e.received,
            ),
            TransferEvent::TransferCancelled(e) => (
                transfer.origin_warehouse_id(),
                1,
                AdjustmentReason::TransferReversal,
                &e.returned,
            ),
            _ => continue,
        };

        for q in quantities.iter().filter(|q| q.quantity > 0) {
            let line = transfer
                .lines()
                .iter()
                .find(|l| l.line_no == q.line_no)
                .ok_or_else(|| ApiError::Internal(format!("transfer line {} vanished", q.line_no)))?;
            let cmd = AdjustStock {
                tenant_id,
                warehouse_id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                delta: sign * q.quantity,
                reason,
                reference: Some(transfer.number().to_string()),
                occurred_at,
            };
            let stock_id = cmd.stock_id();
            uow.execute::<StockLevel>(stock_id.aggregate_id(), InventoryCommand::AdjustStock(cmd))
                .await?;
            adjustments += 1;
        }
    }

    if adjustments > 0 {
        tracing::info!(
            tenant_id = %tenant_id,
            transfer = %transfer.number(),
            adjustments,
            "stock adjusted for transfer"
        );
    }
    Ok(adjustments)
}

/// Collect a receipt and register the payment on its invoice.
///
/// The invoice is checked first so a receipt is never collected against an
/// invoice that cannot take the payment. `remittance_id` names the remittance
/// settling the receipt, if any.
pub async fn collect_receipt(
    uow: &UnitOfWork<'_>,
    tenant_id: TenantId,
    receipt: &Receipt,
    collected_on: NaiveDate,
    remittance_id: Option<AggregateId>,
    occurred_at: DateTime<Utc>,
) -> Result<(), ApiError> {
    let invoice = match receipt.invoice_id() {
        Some(id) => Some(
            uow.read()
                .get::<Invoice>(id)
                .ok_or_else(|| ApiError::not_found("invoice"))?,
        ),
        None => None,
    };
    if let Some(invoice) = &invoice {
        if !invoice.can_accept_payment() || invoice.outstanding_amount() < receipt.amount() {
            return Err(ApiError::invariant(format!(
                "invoice {} cannot take a payment of {} cents (outstanding {})",
                invoice.number(),
                receipt.amount(),
                invoice.outstanding_amount()
            )));
        }
    }

    let receipt_id = receipt.id_typed();
    uow.execute::<Receipt>(
        receipt_id.aggregate_id(),
        ReceiptCommand::Collect(CollectReceipt {
            tenant_id,
            receipt_id,
            collected_on,
            remittance_id,
            occurred_at,
        }),
    )
    .await?;

    if let Some(invoice) = invoice {
        uow.execute::<Invoice>(
            invoice.id_typed().aggregate_id(),
            InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id: invoice.id_typed(),
                amount: receipt.amount(),
                paid_on: collected_on,
                receipt_id: Some(receipt_id.aggregate_id()),
                occurred_at,
            }),
        )
        .await?;
    }

    tracing::info!(
        tenant_id = %tenant_id,
        receipt = %receipt.number(),
        %collected_on,
        "receipt collected"
    );
    Ok(())
}

/// Record a returned receipt. A receipt that had been collected takes its
/// payment back off the invoice.
pub async fn return_receipt(
    uow: &UnitOfWork<'_>,
    tenant_id: TenantId,
    receipt: &Receipt,
    reason: String,
    bank_fee: u64,
    returned_on: NaiveDate,
    occurred_at: DateTime<Utc>,
) -> Result<(), ApiError> {
    let was_collected = receipt.status() == ReceiptStatus::Collected;
    let receipt_id = receipt.id_typed();
    uow.execute::<Receipt>(
        receipt_id.aggregate_id(),
        ReceiptCommand::Return(ReturnReceipt {
            tenant_id,
            receipt_id,
            reason,
            bank_fee,
            returned_on,
            occurred_at,
        }),
    )
    .await?;

    if was_collected {
        if let Some(invoice) = receipt.invoice_id().and_then(|id| uow.read().get::<Invoice>(id)) {
            uow.execute::<Invoice>(
                invoice.id_typed().aggregate_id(),
                InvoiceCommand::ReversePayment(ReversePayment {
                    tenant_id,
                    invoice_id: invoice.id_typed(),
                    amount: receipt.amount(),
                    receipt_id: Some(receipt_id.aggregate_id()),
                    occurred_at,
                }),
            )
            .await?;
        }
    }

    tracing::info!(
        tenant_id = %tenant_id,
        receipt = %receipt.number(),
        was_collected,
        "receipt returned"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gestiona_infra::event_bus::RealtimeBus;
    use gestiona_infra::tenancy::{TenantConfig, TenantRuntime};
    use gestiona_inventory::{
        ConfirmReception, ConfirmShipment, ConfirmTransfer, CreateTransfer, TransferCommand,
        TransferId, TransferLineInput,
    };
    use gestiona_core::UserId;

    async fn runtime() -> TenantRuntime {
        let config = TenantConfig::provisional(TenantId::new());
        TenantRuntime::open(config, Arc::new(RealtimeBus::default())).await.unwrap()
    }

    fn on_hand(read: &ReadModels, warehouse: AggregateId, product: AggregateId) -> i64 {
        read.get::<StockLevel>(StockLevelId::for_product(warehouse, product).aggregate_id())
            .map(|s| s.on_hand())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn transfer_moves_stock_between_warehouses() {
        let rt = runtime().await;
        let tenant = rt.tenant_id();
        let (origin, destination, product) = (AggregateId::new(), AggregateId::new(), AggregateId::new());
        let by = UserId::new();
        let now = Utc::now();
        let uow = rt.begin().await;

        uow.execute::<StockLevel>(
            StockLevelId::for_product(origin, product).aggregate_id(),
            InventoryCommand::AdjustStock(AdjustStock {
                tenant_id: tenant,
                warehouse_id: origin,
                product_id: product,
                product_name: "Cemento".into(),
                delta: 10,
                reason: AdjustmentReason::Manual,
                reference: None,
                occurred_at: now,
            }),
        )
        .await
        .unwrap();

        let id = TransferId::generate();
        let agg = id.aggregate_id();
        uow.execute::<Transfer>(
            agg,
            TransferCommand::Create(CreateTransfer {
                tenant_id: tenant,
                transfer_id: id,
                number: "TRA2024-00001".into(),
                origin_warehouse_id: origin,
                destination_warehouse_id: destination,
                lines: vec![TransferLineInput {
                    product_id: product,
                    product_name: "Cemento".into(),
                    requested: 4,
                }],
                notes: None,
                by,
                occurred_at: now,
            }),
        )
        .await
        .unwrap();
        uow.execute::<Transfer>(
            agg,
            TransferCommand::Confirm(ConfirmTransfer { tenant_id: tenant, transfer_id: id, by, occurred_at: now }),
        )
        .await
        .unwrap();

        let transfer = uow.read().get::<Transfer>(agg).unwrap();
        let shipped = uow
            .execute::<Transfer>(
                agg,
                TransferCommand::ConfirmShipment(ConfirmShipment {
                    tenant_id: tenant,
                    transfer_id: id,
                    shipped: vec![],
                    available: origin_stock(uow.read(), &transfer),
                    by,
                    occurred_at: now,
                }),
            )
            .await
            .unwrap();
        let transfer = uow.read().get::<Transfer>(agg).unwrap();
        assert_eq!(apply_transfer_stock(&uow, tenant, &transfer, &shipped, now).await.unwrap(), 1);
        assert_eq!(on_hand(uow.read(), origin, product), 6);

        let received = uow
            .execute::<Transfer>(
                agg,
                TransferCommand::ConfirmReception(ConfirmReception {
                    tenant_id: tenant,
                    transfer_id: id,
                    received: vec![],
                    by,
                    occurred_at: now,
                }),
            )
            .await
            .unwrap();
        let transfer = uow.read().get::<Transfer>(agg).unwrap();
        apply_transfer_stock(&uow, tenant, &transfer, &received, now).await.unwrap();
        assert_eq!(on_hand(uow.read(), destination, product), 4);
    }

    #[tokio::test]
    async fn numbers_continue_per_prefix() {
        let rt = runtime().await;
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            next_number::<Transfer, _>(rt.read(), "TRA", date, Transfer::number),
            "TRA2024-00001"
        );
    }
}
