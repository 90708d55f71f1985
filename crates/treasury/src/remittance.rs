use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::required_text;
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, Lifecycle,
    TenantId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

use crate::receipt::ReceiptId;

gestiona_core::aggregate_id_newtype!(
    /// Direct-debit remittance (remesa) identifier.
    RemittanceId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceStatus {
    Draft,
    Sent,
    Settled,
    Cancelled,
}

impl Lifecycle for RemittanceStatus {
    fn as_str(self) -> &'static str {
        match self {
            RemittanceStatus::Draft => "draft",
            RemittanceStatus::Sent => "sent",
            RemittanceStatus::Settled => "settled",
            RemittanceStatus::Cancelled => "cancelled",
        }
    }

    fn successors(self) -> &'static [Self] {
        use RemittanceStatus::*;
        match self {
            Draft => &[Sent, Cancelled],
            Sent => &[Settled],
            Settled | Cancelled => &[],
        }
    }
}

/// SEPA sequence type of the debits in the remittance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SequenceType {
    /// First collection under a mandate.
    Frst,
    #[default]
    Rcur,
}

impl SequenceType {
    pub fn code(self) -> &'static str {
        match self {
            SequenceType::Frst => "FRST",
            SequenceType::Rcur => "RCUR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittedReceipt {
    pub receipt_id: ReceiptId,
    pub amount: u64,
}

/// Aggregate root: Remittance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remittance {
    id: RemittanceId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    number: String,
    collection_date: NaiveDate,
    sequence_type: SequenceType,
    receipt_ids: Vec<ReceiptId>,
    total_amount: u64,
    receipt_count: usize,
    status: RemittanceStatus,
    created_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Remittance {
    pub fn empty(id: RemittanceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            collection_date: NaiveDate::MIN,
            sequence_type: SequenceType::default(),
            receipt_ids: Vec::new(),
            total_amount: 0,
            receipt_count: 0,
            status: RemittanceStatus::Draft,
            created_at: None,
            sent_at: None,
            settled_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RemittanceId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn collection_date(&self) -> NaiveDate {
        self.collection_date
    }

    pub fn sequence_type(&self) -> SequenceType {
        self.sequence_type
    }

    pub fn receipt_ids(&self) -> &[ReceiptId] {
        &self.receipt_ids
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn status(&self) -> RemittanceStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl AggregateRoot for Remittance {
    type Id = RemittanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRemittance. `today` is the business date the request is made on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRemittance {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub number: String,
    pub collection_date: NaiveDate,
    pub sequence_type: SequenceType,
    pub receipts: Vec<RemittedReceipt>,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRemittance {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleRemittance {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRemittance {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemittanceCommand {
    Create(CreateRemittance),
    Send(SendRemittance),
    Settle(SettleRemittance),
    Cancel(CancelRemittance),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceCreated {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub number: String,
    pub collection_date: NaiveDate,
    pub sequence_type: SequenceType,
    pub receipts: Vec<RemittedReceipt>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceSent {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceSettled {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub collection_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceCancelled {
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemittanceEvent {
    RemittanceCreated(RemittanceCreated),
    RemittanceSent(RemittanceSent),
    RemittanceSettled(RemittanceSettled),
    RemittanceCancelled(RemittanceCancelled),
}

impl Event for RemittanceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RemittanceEvent::RemittanceCreated(_) => "treasury.remittance.created",
            RemittanceEvent::RemittanceSent(_) => "treasury.remittance.sent",
            RemittanceEvent::RemittanceSettled(_) => "treasury.remittance.settled",
            RemittanceEvent::RemittanceCancelled(_) => "treasury.remittance.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RemittanceEvent::RemittanceCreated(e) => e.occurred_at,
            RemittanceEvent::RemittanceSent(e) => e.occurred_at,
            RemittanceEvent::RemittanceSettled(e) => e.occurred_at,
            RemittanceEvent::RemittanceCancelled(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for RemittanceEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            RemittanceEvent::RemittanceCreated(e) => e.tenant_id,
            RemittanceEvent::RemittanceSent(e) => e.tenant_id,
            RemittanceEvent::RemittanceSettled(e) => e.tenant_id,
            RemittanceEvent::RemittanceCancelled(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Remittance {
    type Command = RemittanceCommand;
    type Event = RemittanceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RemittanceEvent::RemittanceCreated(e) => {
                self.id = e.remittance_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.collection_date = e.collection_date;
                self.sequence_type = e.sequence_type;
                self.receipt_ids = e.receipts.iter().map(|r| r.receipt_id).collect();
                self.total_amount = e.receipts.iter().map(|r| r.amount).sum();
                self.receipt_count = e.receipts.len();
                self.status = RemittanceStatus::Draft;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            RemittanceEvent::RemittanceSent(e) => {
                self.status = RemittanceStatus::Sent;
                self.sent_at = Some(e.occurred_at);
            }
            RemittanceEvent::RemittanceSettled(e) => {
                self.status = RemittanceStatus::Settled;
                self.settled_at = Some(e.occurred_at);
            }
            RemittanceEvent::RemittanceCancelled(_) => {
                self.status = RemittanceStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RemittanceCommand::Create(cmd) => self.handle_create(cmd),
            RemittanceCommand::Send(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.remittance_id)?;
                ensure_transition(self.status, RemittanceStatus::Sent)?;
                Ok(vec![RemittanceEvent::RemittanceSent(RemittanceSent {
                    tenant_id: cmd.tenant_id,
                    remittance_id: cmd.remittance_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RemittanceCommand::Settle(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.remittance_id)?;
                ensure_transition(self.status, RemittanceStatus::Settled)?;
                Ok(vec![RemittanceEvent::RemittanceSettled(RemittanceSettled {
                    tenant_id: cmd.tenant_id,
                    remittance_id: cmd.remittance_id,
                    collection_date: self.collection_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RemittanceCommand::Cancel(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.remittance_id)?;
                ensure_transition(self.status, RemittanceStatus::Cancelled)?;
                Ok(vec![RemittanceEvent::RemittanceCancelled(RemittanceCancelled {
                    tenant_id: cmd.tenant_id,
                    remittance_id: cmd.remittance_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AggregateKind for Remittance {
    const AGGREGATE_TYPE: &'static str = "treasury.remittance";

    fn empty(id: AggregateId) -> Self {
        Remittance::empty(RemittanceId::new(id))
    }

    fn exists(&self) -> bool {
        self.created
    }
}

impl Remittance {
    fn ensure_live(&self, tenant_id: TenantId, remittance_id: RemittanceId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != remittance_id {
            return Err(DomainError::invariant("remittance_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRemittance) -> DomainResult<Vec<RemittanceEvent>> {
        if self.created {
            return Err(DomainError::conflict("remittance already exists"));
        }
        let number = required_text("number", &cmd.number)?;
        if cmd.receipts.is_empty() {
            return Err(DomainError::validation(
                "a remittance needs at least one receipt",
            ));
        }
        if cmd.collection_date < cmd.today {
            return Err(DomainError::validation(
                "collection date cannot be in the past",
            ));
        }
        let mut ids: Vec<_> = cmd.receipts.iter().map(|r| r.receipt_id).collect();
        ids.sort();
        ids.dedup();
        if ids.len() != cmd.receipts.len() {
            return Err(DomainError::validation("a receipt is listed more than once"));
        }
        if cmd.receipts.iter().any(|r| r.amount == 0) {
            return Err(DomainError::validation("remitted amounts must be positive"));
        }
        Ok(vec![RemittanceEvent::RemittanceCreated(RemittanceCreated {
            tenant_id: cmd.tenant_id,
            remittance_id: cmd.remittance_id,
            number,
            collection_date: cmd.collection_date,
            sequence_type: cmd.sequence_type,
            receipts: cmd.receipts.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
