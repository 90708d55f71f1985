use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, CustomerRef, DomainError, DomainResult,
    Lifecycle, TenantId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

use crate::lines::{DocumentLine, DocumentTotals, normalize_lines};

gestiona_core::aggregate_id_newtype!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId
);

/// Invoice status lifecycle. Payment states follow the amount paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    PartiallyPaid,
    Paid,
    Void,
}

impl InvoiceStatus {
    fn for_amounts(total: u64, paid: u64) -> Self {
        if paid == 0 {
            InvoiceStatus::Issued
        } else if paid >= total {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        }
    }
}

impl Lifecycle for InvoiceStatus {
    fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    fn successors(self) -> &'static [Self] {
        use InvoiceStatus::*;
        match self {
            Issued => &[PartiallyPaid, Paid, Void],
            PartiallyPaid => &[Issued, PartiallyPaid, Paid],
            Paid => &[Issued, PartiallyPaid],
            Void => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub customer: CustomerRef,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    #[serde(default)]
    pub payment_method_id: Option<AggregateId>,
    #[serde(default)]
    pub project_id: Option<AggregateId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl InvoiceDetails {
    pub fn normalized(self) -> DomainResult<Self> {
        if self.due_date < self.issue_date {
            return Err(DomainError::validation(
                "due date cannot be earlier than the issue date",
            ));
        }
        Ok(Self {
            customer: self.customer.normalized()?,
            lines: normalize_lines(self.lines)?,
            notes: optional_text(self.notes.as_deref()),
            ..self
        })
    }
}

/// A registered payment. `receipt_id` links it to the receipt that settled it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: u64,
    pub paid_on: NaiveDate,
    pub receipt_id: Option<AggregateId>,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    number: String,
    #[serde(flatten)]
    details: InvoiceDetails,
    delivery_note_ids: Vec<AggregateId>,
    totals: DocumentTotals,
    status: InvoiceStatus,
    total_paid: u64,
    payments: Vec<Payment>,
    void_reason: Option<String>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            details: InvoiceDetails {
                customer: CustomerRef {
                    id: None,
                    name: String::new(),
                    tax_id: None,
                    address: None,
                },
                issue_date: NaiveDate::MIN,
                due_date: NaiveDate::MIN,
                lines: Vec::new(),
                payment_method_id: None,
                project_id: None,
                notes: None,
            },
            delivery_note_ids: Vec::new(),
            totals: DocumentTotals::default(),
            status: InvoiceStatus::Issued,
            total_paid: 0,
            payments: Vec::new(),
            void_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn details(&self) -> &InvoiceDetails {
        &self.details
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn total_amount(&self) -> u64 {
        self.totals.total
    }

    pub fn total_paid(&self) -> u64 {
        self.total_paid
    }

    pub fn outstanding_amount(&self) -> u64 {
        self.totals.total.saturating_sub(self.total_paid)
    }

    pub fn delivery_note_ids(&self) -> &[AggregateId] {
        &self.delivery_note_ids
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// Invariant: cannot pay void invoice.
    pub fn can_accept_payment(&self) -> bool {
        self.status != InvoiceStatus::Void && self.outstanding_amount() > 0
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub details: InvoiceDetails,
    pub delivery_note_ids: Vec<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    /// Payment amount in cents.
    pub amount: u64,
    pub paid_on: NaiveDate,
    pub receipt_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReversePayment (a returned receipt, a bounced transfer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversePayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub receipt_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    RegisterPayment(RegisterPayment),
    ReversePayment(ReversePayment),
    VoidInvoice(VoidInvoice),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub details: InvoiceDetails,
    pub delivery_note_ids: Vec<AggregateId>,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub paid_on: NaiveDate,
    pub receipt_id: Option<AggregateId>,
    pub new_total_paid: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentReversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReversed {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub receipt_id: Option<AggregateId>,
    pub new_total_paid: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceVoided. Carries the delivery notes to release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub delivery_note_ids: Vec<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    PaymentRegistered(PaymentRegistered),
    PaymentReversed(PaymentReversed),
    InvoiceVoided(InvoiceVoided),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::PaymentReversed(_) => "invoicing.invoice.payment_reversed",
            InvoiceEvent::InvoiceVoided(_) => "invoicing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::PaymentReversed(e) => e.occurred_at,
            InvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for InvoiceEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.tenant_id,
            InvoiceEvent::PaymentRegistered(e) => e.tenant_id,
            InvoiceEvent::PaymentReversed(e) => e.tenant_id,
            InvoiceEvent::InvoiceVoided(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.details = e.details.clone();
                self.delivery_note_ids = e.delivery_note_ids.clone();
                self.totals = e.totals.clone();
                self.total_paid = 0;
                self.status = InvoiceStatus::Issued;
                self.created = true;
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.total_paid = e.new_total_paid;
                self.payments.push(Payment {
                    amount: e.amount,
                    paid_on: e.paid_on,
                    receipt_id: e.receipt_id,
                });
                self.status = InvoiceStatus::for_amounts(self.totals.total, self.total_paid);
            }
            InvoiceEvent::PaymentReversed(e) => {
                self.total_paid = e.new_total_paid;
                if let Some(pos) = self
                    .payments
                    .iter()
                    .rposition(|p| p.receipt_id == e.receipt_id && p.amount == e.amount)
                {
                    self.payments.remove(pos);
                }
                self.status = InvoiceStatus::for_amounts(self.totals.total, self.total_paid);
            }
            InvoiceEvent::InvoiceVoided(e) => {
                self.status = InvoiceStatus::Void;
                self.void_reason = Some(e.reason.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::ReversePayment(cmd) => self.handle_reverse_payment(cmd),
            InvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl AggregateKind for Invoice {
    const AGGREGATE_TYPE: &'static str = "invoicing.invoice";

    fn empty(id: AggregateId) -> Self {
        Invoice::empty(InvoiceId::new(id))
    }

    fn exists(&self) -> bool {
        self.created
    }
}

impl Invoice {
    fn ensure_live(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> DomainResult<Vec<InvoiceEvent>> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        let details = cmd.details.clone().normalized()?;
        let totals = DocumentTotals::compute(&details.lines);
        if totals.total == 0 {
            return Err(DomainError::validation("invoice total must be positive"));
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: required_text("number", &cmd.number)?,
            details,
            delivery_note_ids: cmd.delivery_note_ids.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(&self, cmd: &RegisterPayment) -> DomainResult<Vec<InvoiceEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "cannot register payment on void or fully paid invoice",
            ));
        }

        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let new_total_paid = self
            .total_paid
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;

        if new_total_paid > self.totals.total {
            return Err(DomainError::invariant("cannot overpay invoice"));
        }

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            paid_on: cmd.paid_on,
            receipt_id: cmd.receipt_id,
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse_payment(&self, cmd: &ReversePayment) -> DomainResult<Vec<InvoiceEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        if self.status == InvoiceStatus::Void {
            return Err(DomainError::invariant("invoice is void"));
        }
        if cmd.amount == 0 {
            return Err(DomainError::validation("reversed amount must be positive"));
        }
        let new_total_paid = self.total_paid.checked_sub(cmd.amount).ok_or_else(|| {
            DomainError::invariant("cannot reverse more than has been paid")
        })?;

        Ok(vec![InvoiceEvent::PaymentReversed(PaymentReversed {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            receipt_id: cmd.receipt_id,
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> DomainResult<Vec<InvoiceEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        if self.status == InvoiceStatus::Void {
            return Err(DomainError::conflict("invoice is already void"));
        }
        if self.total_paid > 0 {
            return Err(DomainError::invariant(
                "cannot void an invoice with registered payments",
            ));
        }
        ensure_transition(self.status, InvoiceStatus::Void)?;
        let reason = required_text("reason", &cmd.reason)?;

        Ok(vec![InvoiceEvent::InvoiceVoided(InvoiceVoided {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason,
            delivery_note_ids: self.delivery_note_ids.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
