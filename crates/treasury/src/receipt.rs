use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{bounded_amount, optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, CustomerRef, DomainError, DomainResult,
    Lifecycle, TenantId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

use crate::iban::normalize_iban;

gestiona_core::aggregate_id_newtype!(
    /// Receipt (recibo) identifier.
    ReceiptId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Issued,
    Sent,
    Collected,
    Returned,
    Cancelled,
}

impl Lifecycle for ReceiptStatus {
    fn as_str(self) -> &'static str {
        match self {
            ReceiptStatus::Issued => "issued",
            ReceiptStatus::Sent => "sent",
            ReceiptStatus::Collected => "collected",
            ReceiptStatus::Returned => "returned",
            ReceiptStatus::Cancelled => "cancelled",
        }
    }

    fn successors(self) -> &'static [Self] {
        use ReceiptStatus::*;
        match self {
            Issued => &[Sent, Collected, Cancelled],
            Sent => &[Collected, Returned],
            Collected => &[Returned],
            Returned => &[Sent, Collected, Cancelled],
            Cancelled => &[],
        }
    }
}

/// SEPA direct-debit mandate signed by the debtor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mandate {
    pub reference: String,
    pub signed_on: NaiveDate,
}

/// Bank details needed to collect the receipt by direct debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectDebit {
    pub iban: String,
    pub mandate: Mandate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDetails {
    #[serde(default)]
    pub invoice_id: Option<AggregateId>,
    pub customer: CustomerRef,
    /// Cents.
    pub amount: u64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub debtor_iban: Option<String>,
    #[serde(default)]
    pub mandate: Option<Mandate>,
    #[serde(default)]
    pub payment_method_id: Option<AggregateId>,
    #[serde(default)]
    pub concept: Option<String>,
}

impl ReceiptDetails {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.customer = self.customer.normalized()?;
        if self.amount == 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        bounded_amount("amount", self.amount)?;
        if self.due_date < self.issue_date {
            return Err(DomainError::validation(
                "due date cannot be earlier than the issue date",
            ));
        }
        self.debtor_iban = match optional_text(self.debtor_iban.as_deref()) {
            Some(iban) => Some(normalize_iban(&iban)?),
            None => None,
        };
        if let Some(mandate) = &mut self.mandate {
            mandate.reference = required_text("mandate reference", &mandate.reference)?;
            if mandate.reference.len() > 35 {
                return Err(DomainError::validation(
                    "mandate reference cannot exceed 35 characters",
                ));
            }
        }
        self.concept = optional_text(self.concept.as_deref());
        Ok(self)
    }

    pub fn direct_debit(&self) -> Option<DirectDebit> {
        match (&self.debtor_iban, &self.mandate) {
            (Some(iban), Some(mandate)) => Some(DirectDebit {
                iban: iban.clone(),
                mandate: mandate.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptReturn {
    pub reason: String,
    /// Cents charged by the bank for the return.
    pub bank_fee: u64,
    pub returned_on: NaiveDate,
    pub remittance_id: Option<AggregateId>,
}

/// Aggregate root: Receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    id: ReceiptId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    number: String,
    #[serde(flatten)]
    details: ReceiptDetails,
    status: ReceiptStatus,
    remittance_id: Option<AggregateId>,
    collected_on: Option<NaiveDate>,
    #[serde(rename = "return")]
    returned: Option<ReceiptReturn>,
    cancellation_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Receipt {
    pub fn empty(id: ReceiptId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            details: ReceiptDetails {
                invoice_id: None,
                customer: CustomerRef {
                    id: None,
                    name: String::new(),
                    tax_id: None,
                    address: None,
                },
                amount: 0,
                issue_date: NaiveDate::MIN,
                due_date: NaiveDate::MIN,
                debtor_iban: None,
                mandate: None,
                payment_method_id: None,
                concept: None,
            },
            status: ReceiptStatus::Issued,
            remittance_id: None,
            collected_on: None,
            returned: None,
            cancellation_reason: None,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReceiptId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn details(&self) -> &ReceiptDetails {
        &self.details
    }

    pub fn amount(&self) -> u64 {
        self.details.amount
    }

    pub fn invoice_id(&self) -> Option<AggregateId> {
        self.details.invoice_id
    }

    pub fn status(&self) -> ReceiptStatus {
        self.status
    }

    pub fn remittance_id(&self) -> Option<AggregateId> {
        self.remittance_id
    }

    pub fn collected_on(&self) -> Option<NaiveDate> {
        self.collected_on
    }

    /// Eligible for a new remittance (remesable).
    pub fn is_remittable(&self) -> bool {
        matches!(self.status, ReceiptStatus::Issued | ReceiptStatus::Returned)
            && self.remittance_id.is_none()
            && self.details.direct_debit().is_some()
    }
}

impl AggregateRoot for Receipt {
    type Id = ReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueReceipt {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub number: String,
    pub details: ReceiptDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReceipt {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub details: ReceiptDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignReceiptToRemittance {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub remittance_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReceiptFromRemittance {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReceiptSent {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    /// Remittance performing the move; `None` for a receipt handled on its own.
    #[serde(default)]
    pub remittance_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectReceipt {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub collected_on: NaiveDate,
    #[serde(default)]
    pub remittance_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReceipt {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub reason: String,
    pub bank_fee: u64,
    pub returned_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReceipt {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptCommand {
    Issue(IssueReceipt),
    Update(UpdateReceipt),
    AssignToRemittance(AssignReceiptToRemittance),
    ReleaseFromRemittance(ReleaseReceiptFromRemittance),
    MarkSent(MarkReceiptSent),
    Collect(CollectReceipt),
    Return(ReturnReceipt),
    Cancel(CancelReceipt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptIssued {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub number: String,
    pub details: ReceiptDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptUpdated {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub details: ReceiptDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptAssigned {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub remittance_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptReleased {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub remittance_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSent {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptCollected {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub invoice_id: Option<AggregateId>,
    pub amount: u64,
    pub collected_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptReturned. `was_collected` tells whether a registered payment must be reversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptReturned {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub invoice_id: Option<AggregateId>,
    pub amount: u64,
    pub was_collected: bool,
    pub details: ReceiptReturn,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptCancelled {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptEvent {
    ReceiptIssued(ReceiptIssued),
    ReceiptUpdated(ReceiptUpdated),
    ReceiptAssigned(ReceiptAssigned),
    ReceiptReleased(ReceiptReleased),
    ReceiptSent(ReceiptSent),
    ReceiptCollected(ReceiptCollected),
    ReceiptReturned(ReceiptReturned),
    ReceiptCancelled(ReceiptCancelled),
}

impl Event for ReceiptEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReceiptEvent::ReceiptIssued(_) => "treasury.receipt.issued",
            ReceiptEvent::ReceiptUpdated(_) => "treasury.receipt.updated",
            ReceiptEvent::ReceiptAssigned(_) => "treasury.receipt.assigned",
            ReceiptEvent::ReceiptReleased(_) => "treasury.receipt.released",
            ReceiptEvent::ReceiptSent(_) => "treasury.receipt.sent",
            ReceiptEvent::ReceiptCollected(_) => "treasury.receipt.collected",
            ReceiptEvent::ReceiptReturned(_) => "treasury.receipt.returned",
            ReceiptEvent::ReceiptCancelled(_) => "treasury.receipt.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReceiptEvent::ReceiptIssued(e) => e.occurred_at,
            ReceiptEvent::ReceiptUpdated(e) => e.occurred_at,
            ReceiptEvent::ReceiptAssigned(e) => e.occurred_at,
            ReceiptEvent::ReceiptReleased(e) => e.occurred_at,
            ReceiptEvent::ReceiptSent(e) => e.occurred_at,
            ReceiptEvent::ReceiptCollected(e) => e.occurred_at,
            ReceiptEvent::ReceiptReturned(e) => e.occurred_at,
            ReceiptEvent::ReceiptCancelled(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for ReceiptEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            ReceiptEvent::ReceiptIssued(e) => e.tenant_id,
            ReceiptEvent::ReceiptUpdated(e) => e.tenant_id,
            ReceiptEvent::ReceiptAssigned(e) => e.tenant_id,
            ReceiptEvent::ReceiptReleased(e) => e.tenant_id,
            ReceiptEvent::ReceiptSent(e) => e.tenant_id,
            ReceiptEvent::ReceiptCollected(e) => e.tenant_id,
            ReceiptEvent::ReceiptReturned(e) => e.tenant_id,
            ReceiptEvent::ReceiptCancelled(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Receipt {
    type Command = ReceiptCommand;
    type Event = ReceiptEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReceiptEvent::ReceiptIssued(e) => {
                self.id = e.receipt_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.details = e.details.clone();
                self.status = ReceiptStatus::Issued;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ReceiptEvent::ReceiptUpdated(e) => {
                self.details = e.details.clone();
            }
            ReceiptEvent::ReceiptAssigned(e) => {
                self.remittance_id = Some(e.remittance_id);
            }
            ReceiptEvent::ReceiptReleased(_) => {
                self.remittance_id = None;
            }
            ReceiptEvent::ReceiptSent(_) => {
                self.status = ReceiptStatus::Sent;
            }
            ReceiptEvent::ReceiptCollected(e) => {
                self.status = ReceiptStatus::Collected;
                self.collected_on = Some(e.collected_on);
            }
            ReceiptEvent::ReceiptReturned(e) => {
                self.status = ReceiptStatus::Returned;
                self.collected_on = None;
                // a returned receipt can go into a new remittance
                self.remittance_id = None;
                self.returned = Some(e.details.clone());
            }
            ReceiptEvent::ReceiptCancelled(e) => {
                self.status = ReceiptStatus::Cancelled;
                self.cancellation_reason = Some(e.reason.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReceiptCommand::Issue(cmd) => self.handle_issue(cmd),
            ReceiptCommand::Update(cmd) => self.handle_update(cmd),
            ReceiptCommand::AssignToRemittance(cmd) => self.handle_assign(cmd),
            ReceiptCommand::ReleaseFromRemittance(cmd) => self.handle_release(cmd),
            ReceiptCommand::MarkSent(cmd) => self.handle_sent(cmd),
            ReceiptCommand::Collect(cmd) => self.handle_collect(cmd),
            ReceiptCommand::Return(cmd) => self.handle_return(cmd),
            ReceiptCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl AggregateKind for Receipt {
    const AGGREGATE_TYPE: &'static str = "treasury.receipt";

    fn empty(id: AggregateId) -> Self {
        Receipt::empty(ReceiptId::new(id))
    }

    fn exists(&self) -> bool {
        self.created
    }
}

impl Receipt {
    fn ensure_live(&self, tenant_id: TenantId, receipt_id: ReceiptId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != receipt_id {
            return Err(DomainError::invariant("receipt_id mismatch"));
        }
        Ok(())
    }

    /// A receipt inside a remittance is sent and collected only by that remittance.
    fn ensure_moved_by(&self, acting: Option<AggregateId>) -> DomainResult<()> {
        match (self.remittance_id, acting) {
            (None, None) => Ok(()),
            (Some(own), Some(acting)) if own == acting => Ok(()),
            (Some(_), _) => Err(DomainError::invariant(format!(
                "receipt {} belongs to a remittance and moves with it",
                self.number
            ))),
            (None, Some(_)) => Err(DomainError::invariant(format!(
                "receipt {} is not part of that remittance",
                self.number
            ))),
        }
    }

    fn handle_issue(&self, cmd: &IssueReceipt) -> DomainResult<Vec<ReceiptEvent>> {
        if self.created {
            return Err(DomainError::conflict("receipt already exists"));
        }
        Ok(vec![ReceiptEvent::ReceiptIssued(ReceiptIssued {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            number: required_text("number", &cmd.number)?,
            details: cmd.details.clone().normalized()?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateReceipt) -> DomainResult<Vec<ReceiptEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.receipt_id)?;
        if self.status != ReceiptStatus::Issued || self.remittance_id.is_some() {
            return Err(DomainError::invariant(
                "only issued receipts outside a remittance can be edited",
            ));
        }
        let details = cmd.details.clone().normalized()?;
        if details.invoice_id != self.details.invoice_id {
            return Err(DomainError::invariant("the linked invoice cannot be changed"));
        }
        if details == self.details {
            return Ok(vec![]);
        }
        Ok(vec![ReceiptEvent::ReceiptUpdated(ReceiptUpdated {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignReceiptToRemittance) -> DomainResult<Vec<ReceiptEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.receipt_id)?;
        if !self.is_remittable() {
            return Err(DomainError::invariant(format!(
                "receipt {} cannot be remitted (status '{}', needs IBAN and mandate, not in another remittance)",
                self.number,
                self.status.as_str()
            )));
        }
        Ok(vec![ReceiptEvent::ReceiptAssigned(ReceiptAssigned {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            remittance_id: cmd.remittance_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseReceiptFromRemittance) -> DomainResult<Vec<ReceiptEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.receipt_id)?;
        let Some(remittance_id) = self.remittance_id else {
            return Ok(vec![]);
        };
        if self.status == ReceiptStatus::Sent {
            return Err(DomainError::invariant(
                "a receipt already sent to the bank cannot leave its remittance",
            ));
        }
        Ok(vec![ReceiptEvent::ReceiptReleased(ReceiptReleased {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            remittance_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sent(&self, cmd: &MarkReceiptSent) -> DomainResult<Vec<ReceiptEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.receipt_id)?;
        self.ensure_moved_by(cmd.remittance_id)?;
        ensure_transition(self.status, ReceiptStatus::Sent)?;
        Ok(vec![ReceiptEvent::ReceiptSent(ReceiptSent {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_collect(&self, cmd: &CollectReceipt) -> DomainResult<Vec<ReceiptEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.receipt_id)?;
        self.ensure_moved_by(cmd.remittance_id)?;
        ensure_transition(self.status, ReceiptStatus::Collected)?;
        if cmd.collected_on < self.details.issue_date {
            return Err(DomainError::validation(
                "collection date cannot be earlier than the issue date",
            ));
        }
        Ok(vec![ReceiptEvent::ReceiptCollected(ReceiptCollected {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            invoice_id: self.details.invoice_id,
            amount: self.details.amount,
            collected_on: cmd.collected_on,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnReceipt) -> DomainResult<Vec<ReceiptEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.receipt_id)?;
        ensure_transition(self.status, ReceiptStatus::Returned)?;
        let reason = required_text("reason", &cmd.reason)?;
        Ok(vec![ReceiptEvent::ReceiptReturned(ReceiptReturned {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            invoice_id: self.details.invoice_id,
            amount: self.details.amount,
            was_collected: self.status == ReceiptStatus::Collected,
            details: ReceiptReturn {
                reason,
                bank_fee: cmd.bank_fee,
                returned_on: cmd.returned_on,
                remittance_id: self.remittance_id,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelReceipt) -> DomainResult<Vec<ReceiptEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.receipt_id)?;
        let reason = required_text("reason", &cmd.reason)?;
        if self.remittance_id.is_some() {
            return Err(DomainError::invariant(
                "a receipt inside a remittance cannot be cancelled",
            ));
        }
        ensure_transition(self.status, ReceiptStatus::Cancelled)?;
        Ok(vec![ReceiptEvent::ReceiptCancelled(ReceiptCancelled {
            tenant_id: cmd.tenant_id,
            receipt_id: cmd.receipt_id,
            reason,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn details(with_debit: bool) -> ReceiptDetails {
        ReceiptDetails {
            invoice_id: Some(AggregateId::new()),
            customer: CustomerRef {
                id: None,
                name: "Construcciones Ebro".into(),
                tax_id: Some("B50000000".into()),
                address: None,
            },
            amount: 1_210_00,
            issue_date: date(2026, 3, 1),
            due_date: date(2026, 3, 31),
            debtor_iban: with_debit.then(|| "ES91 2100 0418 4502 0005 1332".to_string()),
            mandate: with_debit.then(|| Mandate {
                reference: "MAND-0001".into(),
                signed_on: date(2025, 12, 1),
            }),
            payment_method_id: None,
            concept: None,
        }
    }

    fn run(receipt: &mut Receipt, cmd: ReceiptCommand) -> DomainResult<Vec<ReceiptEvent>> {
        let events = receipt.handle(&cmd)?;
        for e in &events {
            receipt.apply(e);
        }
        Ok(events)
    }

    fn issued(tenant_id: TenantId, with_debit: bool) -> Receipt {
        let id = ReceiptId::generate();
        let mut receipt = Receipt::empty(id);
        run(
            &mut receipt,
            ReceiptCommand::Issue(IssueReceipt {
                tenant_id,
                receipt_id: id,
                number: "REC2026-00001".into(),
                details: details(with_debit),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        receipt
    }

    #[test]
    fn iban_is_normalised_and_checked() {
        let receipt = issued(TenantId::new(), true);
        assert_eq!(
            receipt.details().debtor_iban.as_deref(),
            Some("ES9121000418450200051332")
        );

        let mut bad = details(true);
        bad.debtor_iban = Some("ES0021000418450200051332".into());
        assert!(matches!(bad.normalized(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn due_date_before_issue_is_rejected() {
        let mut d = details(false);
        d.due_date = date(2026, 2, 1);
        assert!(d.normalized().is_err());
    }

    #[test]
    fn eligibility_needs_bank_details() {
        let t = TenantId::new();
        assert!(issued(t, true).is_remittable());
        assert!(!issued(t, false).is_remittable());
    }

    #[test]
    fn collected_then_returned_reverses_payment() {
        let t = TenantId::new();
        let mut receipt = issued(t, true);
        let id = receipt.id_typed();
        run(
            &mut receipt,
            ReceiptCommand::Collect(CollectReceipt {
                tenant_id: t,
                receipt_id: id,
                collected_on: date(2026, 3, 31),
                remittance_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(receipt.collected_on(), Some(date(2026, 3, 31)));

        let return_cmd = |reason: &str| {
            ReceiptCommand::Return(ReturnReceipt {
                tenant_id: t,
                receipt_id: id,
                reason: reason.into(),
                bank_fee: 3_50,
                returned_on: date(2026, 4, 3),
                occurred_at: Utc::now(),
            })
        };
        assert!(run(&mut receipt, return_cmd(" ")).is_err());

        let events = run(&mut receipt, return_cmd("MD06 devolución del cliente")).unwrap();
        match &events[0] {
            ReceiptEvent::ReceiptReturned(e) => assert!(e.was_collected),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(receipt.status(), ReceiptStatus::Returned);
        assert!(receipt.is_remittable());
    }

    #[test]
    fn receipt_in_remittance_cannot_be_cancelled_or_edited() {
        let t = TenantId::new();
        let mut receipt = issued(t, true);
        let id = receipt.id_typed();
        run(
            &mut receipt,
            ReceiptCommand::AssignToRemittance(AssignReceiptToRemittance {
                tenant_id: t,
                receipt_id: id,
                remittance_id: AggregateId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = run(
            &mut receipt,
            ReceiptCommand::Cancel(CancelReceipt {
                tenant_id: t,
                receipt_id: id,
                reason: "duplicado".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("inside a remittance")));

        let err = run(
            &mut receipt,
            ReceiptCommand::Update(UpdateReceipt {
                tenant_id: t,
                receipt_id: id,
                details: details(true),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn sent_receipt_cannot_be_cancelled() {
        let t = TenantId::new();
        let mut receipt = issued(t, false);
        let id = receipt.id_typed();
        run(
            &mut receipt,
            ReceiptCommand::MarkSent(MarkReceiptSent {
                tenant_id: t,
                receipt_id: id,
                remittance_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let err = run(
            &mut receipt,
            ReceiptCommand::Cancel(CancelReceipt {
                tenant_id: t,
                receipt_id: id,
                reason: "error".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::invariant("cannot move from 'sent' to 'cancelled'"));
    }

    #[test]
    fn remitted_receipt_moves_only_with_its_remittance() {
        let t = TenantId::new();
        let mut receipt = issued(t, true);
        let id = receipt.id_typed();
        let remittance = AggregateId::new();
        run(
            &mut receipt,
            ReceiptCommand::AssignToRemittance(AssignReceiptToRemittance {
                tenant_id: t,
                receipt_id: id,
                remittance_id: remittance,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let collect = |remittance_id| {
            ReceiptCommand::Collect(CollectReceipt {
                tenant_id: t,
                receipt_id: id,
                collected_on: date(2026, 3, 31),
                remittance_id,
                occurred_at: Utc::now(),
            })
        };
        let send = |remittance_id| {
            ReceiptCommand::MarkSent(MarkReceiptSent {
                tenant_id: t,
                receipt_id: id,
                remittance_id,
                occurred_at: Utc::now(),
            })
        };

        let err = run(&mut receipt, collect(None)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("moves with it")));
        assert!(run(&mut receipt, send(None)).is_err());
        assert!(run(&mut receipt, send(Some(AggregateId::new()))).is_err());
        assert_eq!(receipt.status(), ReceiptStatus::Issued);

        run(&mut receipt, send(Some(remittance))).unwrap();
        run(&mut receipt, collect(Some(remittance))).unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Collected);
    }

    #[test]
    fn free_receipt_rejects_a_foreign_remittance() {
        let t = TenantId::new();
        let receipt = issued(t, true);
        let err = receipt
            .handle(&ReceiptCommand::MarkSent(MarkReceiptSent {
                tenant_id: t,
                receipt_id: receipt.id_typed(),
                remittance_id: Some(AggregateId::new()),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("not part of")));
    }
}
