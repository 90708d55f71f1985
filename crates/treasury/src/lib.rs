//! Treasury: payment methods (formas de pago), receivable receipts (recibos),
//! direct-debit remittances (remesas) and their SEPA export.

pub mod iban;
pub mod payment_method;
pub mod receipt;
pub mod remittance;
pub mod sepa;

pub use iban::{is_valid_bic, normalize_iban};
pub use payment_method::{
    CreatePaymentMethod, DeletePaymentMethod, DueInstallment, Installment, PaymentKind,
    PaymentMethod, PaymentMethodActivationChanged, PaymentMethodCommand, PaymentMethodCreated,
    PaymentMethodDeleted, PaymentMethodDetails, PaymentMethodEvent, PaymentMethodId,
    PaymentMethodUpdated, SetPaymentMethodActive, UpdatePaymentMethod, schedule,
};
pub use receipt::{
    AssignReceiptToRemittance, CancelReceipt, CollectReceipt, DirectDebit, IssueReceipt,
    Mandate, MarkReceiptSent, Receipt, ReceiptAssigned, ReceiptCancelled, ReceiptCollected,
    ReceiptCommand, ReceiptDetails, ReceiptEvent, ReceiptId, ReceiptIssued, ReceiptReleased,
    ReceiptReturn, ReceiptReturned, ReceiptSent, ReceiptStatus, ReceiptUpdated,
    ReleaseReceiptFromRemittance, ReturnReceipt, UpdateReceipt,
};
pub use remittance::{
    CancelRemittance, CreateRemittance, RemittedReceipt, Remittance, RemittanceCancelled,
    RemittanceCommand, RemittanceCreated, RemittanceEvent, RemittanceId, RemittanceSent,
    RemittanceSettled, RemittanceStatus, SendRemittance, SequenceType, SettleRemittance,
};
pub use sepa::{SepaBatch, SepaCreditor, SepaDebit, SepaError, pain008};
