//! Invoicing domain module (event-sourced).
//!
//! Delivery notes (albaranes), invoices and the line/tax arithmetic they
//! share, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod billing;
pub mod delivery_note;
pub mod invoice;
pub mod lines;

pub use billing::invoice_lines_from_notes;
pub use delivery_note::{
    CancelDeliveryNote, CreateDeliveryNote, DeleteDeliveryNote, DeliverNote, DeliveryNote,
    DeliveryNoteCancelled, DeliveryNoteCommand, DeliveryNoteCreated, DeliveryNoteDeleted,
    DeliveryNoteDelivered, DeliveryNoteDetails, DeliveryNoteEvent, DeliveryNoteId,
    DeliveryNoteInvoiced, DeliveryNoteReleased, DeliveryNoteStatus, DeliveryNoteUpdated,
    MarkNoteInvoiced, ReleaseNoteFromInvoice, UpdateDeliveryNote,
};
pub use invoice::{
    Invoice, InvoiceCommand, InvoiceDetails, InvoiceEvent, InvoiceId, InvoiceIssued,
    InvoiceStatus, InvoiceVoided, IssueInvoice, Payment, PaymentRegistered, PaymentReversed,
    RegisterPayment, ReversePayment, VoidInvoice,
};
pub use lines::{DocumentLine, DocumentTotals, QUANTITY_SCALE, TaxBucket, normalize_lines};
