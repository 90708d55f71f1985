//! Inventory domain module (event-sourced).
//!
//! Stock on hand per warehouse and product, and transfers (traspasos) that
//! move stock between warehouses. Pure domain logic; the caller applies the
//! stock effects a transfer reports.

pub mod stock;
pub mod transfer;

pub use stock::{
    AdjustStock, AdjustmentReason, InventoryCommand, InventoryEvent, StockAdjusted, StockLevel,
    StockLevelId,
};
pub use transfer::{
    CancelTransfer, ConfirmReception, ConfirmShipment, ConfirmTransfer, CreateTransfer,
    DeleteTransfer, LineQuantity, Stamp, Transfer, TransferAudit, TransferCancelled,
    TransferCommand, TransferConfirmed, TransferCreated, TransferDeleted, TransferEvent,
    TransferId, TransferLine, TransferLineInput, TransferReceived, TransferShipped,
    TransferStatus, TransferUpdated, UpdateTransfer,
};
