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
    /// Delivery note (albarán) identifier.
    DeliveryNoteId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryNoteStatus {
    Draft,
    Delivered,
    Invoiced,
    Cancelled,
}

impl Lifecycle for DeliveryNoteStatus {
    fn as_str(self) -> &'static str {
        match self {
            DeliveryNoteStatus::Draft => "draft",
            DeliveryNoteStatus::Delivered => "delivered",
            DeliveryNoteStatus::Invoiced => "invoiced",
            DeliveryNoteStatus::Cancelled => "cancelled",
        }
    }

    fn successors(self) -> &'static [Self] {
        use DeliveryNoteStatus::*;
        match self {
            Draft => &[Delivered, Cancelled],
            Delivered => &[Invoiced, Cancelled],
            Invoiced => &[Delivered],
            Cancelled => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteDetails {
    pub customer: CustomerRef,
    pub date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    #[serde(default)]
    pub project_id: Option<AggregateId>,
    #[serde(default)]
    pub warehouse_id: Option<AggregateId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DeliveryNoteDetails {
    pub fn normalized(self) -> DomainResult<Self> {
        Ok(Self {
            customer: self.customer.normalized()?,
            lines: normalize_lines(self.lines)?,
            notes: optional_text(self.notes.as_deref()),
            ..self
        })
    }
}

/// Aggregate root: DeliveryNote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryNote {
    id: DeliveryNoteId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    number: String,
    #[serde(flatten)]
    details: DeliveryNoteDetails,
    totals: DocumentTotals,
    status: DeliveryNoteStatus,
    invoice_id: Option<AggregateId>,
    delivered_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl DeliveryNote {
    pub fn empty(id: DeliveryNoteId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            details: DeliveryNoteDetails {
                customer: CustomerRef {
                    id: None,
                    name: String::new(),
                    tax_id: None,
                    address: None,
                },
                date: NaiveDate::MIN,
                lines: Vec::new(),
                project_id: None,
                warehouse_id: None,
                notes: None,
            },
            totals: DocumentTotals::default(),
            status: DeliveryNoteStatus::Draft,
            invoice_id: None,
            delivered_at: None,
            cancellation_reason: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> DeliveryNoteId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn details(&self) -> &DeliveryNoteDetails {
        &self.details
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn status(&self) -> DeliveryNoteStatus {
        self.status
    }

    pub fn invoice_id(&self) -> Option<AggregateId> {
        self.invoice_id
    }
}

impl AggregateRoot for DeliveryNote {
    type Id = DeliveryNoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeliveryNote {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub number: String,
    pub details: DeliveryNoteDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDeliveryNote {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub details: DeliveryNoteDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverNote {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelDeliveryNote {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkNoteInvoiced {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseNoteFromInvoice. Issued when the invoice is voided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNoteFromInvoice {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDeliveryNote {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryNoteCommand {
    Create(CreateDeliveryNote),
    Update(UpdateDeliveryNote),
    Deliver(DeliverNote),
    Cancel(CancelDeliveryNote),
    MarkInvoiced(MarkNoteInvoiced),
    ReleaseFromInvoice(ReleaseNoteFromInvoice),
    Delete(DeleteDeliveryNote),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteCreated {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub number: String,
    pub details: DeliveryNoteDetails,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteUpdated {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub details: DeliveryNoteDetails,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteDelivered {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteCancelled {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteInvoiced {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteReleased {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteDeleted {
    pub tenant_id: TenantId,
    pub delivery_note_id: DeliveryNoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryNoteEvent {
    DeliveryNoteCreated(DeliveryNoteCreated),
    DeliveryNoteUpdated(DeliveryNoteUpdated),
    DeliveryNoteDelivered(DeliveryNoteDelivered),
    DeliveryNoteCancelled(DeliveryNoteCancelled),
    DeliveryNoteInvoiced(DeliveryNoteInvoiced),
    DeliveryNoteReleased(DeliveryNoteReleased),
    DeliveryNoteDeleted(DeliveryNoteDeleted),
}

impl Event for DeliveryNoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryNoteEvent::DeliveryNoteCreated(_) => "invoicing.delivery_note.created",
            DeliveryNoteEvent::DeliveryNoteUpdated(_) => "invoicing.delivery_note.updated",
            DeliveryNoteEvent::DeliveryNoteDelivered(_) => "invoicing.delivery_note.delivered",
            DeliveryNoteEvent::DeliveryNoteCancelled(_) => "invoicing.delivery_note.cancelled",
            DeliveryNoteEvent::DeliveryNoteInvoiced(_) => "invoicing.delivery_note.invoiced",
            DeliveryNoteEvent::DeliveryNoteReleased(_) => "invoicing.delivery_note.released",
            DeliveryNoteEvent::DeliveryNoteDeleted(_) => "invoicing.delivery_note.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryNoteEvent::DeliveryNoteCreated(e) => e.occurred_at,
            DeliveryNoteEvent::DeliveryNoteUpdated(e) => e.occurred_at,
            DeliveryNoteEvent::DeliveryNoteDelivered(e) => e.occurred_at,
            DeliveryNoteEvent::DeliveryNoteCancelled(e) => e.occurred_at,
            DeliveryNoteEvent::DeliveryNoteInvoiced(e) => e.occurred_at,
            DeliveryNoteEvent::DeliveryNoteReleased(e) => e.occurred_at,
            DeliveryNoteEvent::DeliveryNoteDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for DeliveryNoteEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            DeliveryNoteEvent::DeliveryNoteCreated(e) => e.tenant_id,
            DeliveryNoteEvent::DeliveryNoteUpdated(e) => e.tenant_id,
            DeliveryNoteEvent::DeliveryNoteDelivered(e) => e.tenant_id,
            DeliveryNoteEvent::DeliveryNoteCancelled(e) => e.tenant_id,
            DeliveryNoteEvent::DeliveryNoteInvoiced(e) => e.tenant_id,
            DeliveryNoteEvent::DeliveryNoteReleased(e) => e.tenant_id,
            DeliveryNoteEvent::DeliveryNoteDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for DeliveryNote {
    type Command = DeliveryNoteCommand;
    type Event = DeliveryNoteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryNoteEvent::DeliveryNoteCreated(e) => {
                self.id = e.delivery_note_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.details = e.details.clone();
                self.totals = e.totals.clone();
                self.status = DeliveryNoteStatus::Draft;
                self.created = true;
            }
            DeliveryNoteEvent::DeliveryNoteUpdated(e) => {
                self.details = e.details.clone();
                self.totals = e.totals.clone();
            }
            DeliveryNoteEvent::DeliveryNoteDelivered(e) => {
                self.status = DeliveryNoteStatus::Delivered;
                self.delivered_at = Some(e.occurred_at);
            }
            DeliveryNoteEvent::DeliveryNoteCancelled(e) => {
                self.status = DeliveryNoteStatus::Cancelled;
                self.cancellation_reason = Some(e.reason.clone());
            }
            DeliveryNoteEvent::DeliveryNoteInvoiced(e) => {
                self.status = DeliveryNoteStatus::Invoiced;
                self.invoice_id = Some(e.invoice_id);
            }
            DeliveryNoteEvent::DeliveryNoteReleased(_) => {
                self.status = DeliveryNoteStatus::Delivered;
                self.invoice_id = None;
            }
            DeliveryNoteEvent::DeliveryNoteDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryNoteCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("delivery note already exists"));
                }
                let details = cmd.details.clone().normalized()?;
                Ok(vec![DeliveryNoteEvent::DeliveryNoteCreated(DeliveryNoteCreated {
                    tenant_id: cmd.tenant_id,
                    delivery_note_id: cmd.delivery_note_id,
                    number: required_text("number", &cmd.number)?,
                    totals: DocumentTotals::compute(&details.lines),
                    details,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryNoteCommand::Update(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.delivery_note_id)?;
                self.ensure_draft("updated")?;
                let details = cmd.details.clone().normalized()?;
                if details == self.details {
                    return Ok(vec![]);
                }
                Ok(vec![DeliveryNoteEvent::DeliveryNoteUpdated(DeliveryNoteUpdated {
                    tenant_id: cmd.tenant_id,
                    delivery_note_id: cmd.delivery_note_id,
                    totals: DocumentTotals::compute(&details.lines),
                    details,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryNoteCommand::Deliver(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.delivery_note_id)?;
                if self.status != DeliveryNoteStatus::Draft {
                    return Err(DomainError::invariant("only draft delivery notes can be delivered"));
                }
                Ok(vec![DeliveryNoteEvent::DeliveryNoteDelivered(DeliveryNoteDelivered {
                    tenant_id: cmd.tenant_id,
                    delivery_note_id: cmd.delivery_note_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryNoteCommand::Cancel(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.delivery_note_id)?;
                let reason = required_text("reason", &cmd.reason)?;
                ensure_transition(self.status, DeliveryNoteStatus::Cancelled)?;
                Ok(vec![DeliveryNoteEvent::DeliveryNoteCancelled(DeliveryNoteCancelled {
                    tenant_id: cmd.tenant_id,
                    delivery_note_id: cmd.delivery_note_id,
                    reason,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryNoteCommand::MarkInvoiced(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.delivery_note_id)?;
                if self.status != DeliveryNoteStatus::Delivered {
                    return Err(DomainError::invariant(format!(
                        "delivery note {} is {}, only delivered notes can be invoiced",
                        self.number,
                        self.status.as_str()
                    )));
                }
                Ok(vec![DeliveryNoteEvent::DeliveryNoteInvoiced(DeliveryNoteInvoiced {
                    tenant_id: cmd.tenant_id,
                    delivery_note_id: cmd.delivery_note_id,
                    invoice_id: cmd.invoice_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryNoteCommand::ReleaseFromInvoice(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.delivery_note_id)?;
                if self.invoice_id != Some(cmd.invoice_id) {
                    return Err(DomainError::invariant(
                        "delivery note is not linked to that invoice",
                    ));
                }
                ensure_transition(self.status, DeliveryNoteStatus::Delivered)?;
                Ok(vec![DeliveryNoteEvent::DeliveryNoteReleased(DeliveryNoteReleased {
                    tenant_id: cmd.tenant_id,
                    delivery_note_id: cmd.delivery_note_id,
                    invoice_id: cmd.invoice_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            DeliveryNoteCommand::Delete(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.delivery_note_id)?;
                self.ensure_draft("deleted")?;
                Ok(vec![DeliveryNoteEvent::DeliveryNoteDeleted(DeliveryNoteDeleted {
                    tenant_id: cmd.tenant_id,
                    delivery_note_id: cmd.delivery_note_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AggregateKind for DeliveryNote {
    const AGGREGATE_TYPE: &'static str = "invoicing.delivery_note";

    fn empty(id: AggregateId) -> Self {
        DeliveryNote::empty(DeliveryNoteId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl DeliveryNote {
    fn ensure_live(&self, tenant_id: TenantId, id: DeliveryNoteId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != id {
            return Err(DomainError::invariant("delivery_note_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, action: &str) -> DomainResult<()> {
        if self.status != DeliveryNoteStatus::Draft {
            return Err(DomainError::invariant(format!(
                "only draft delivery notes can be {action}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn customer(name: &str) -> CustomerRef {
        CustomerRef {
            id: None,
            name: name.into(),
            tax_id: None,
            address: None,
        }
    }

    pub(crate) fn details(customer_name: &str, price: u64) -> DeliveryNoteDetails {
        DeliveryNoteDetails {
            customer: customer(customer_name),
            date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            lines: vec![DocumentLine {
                line_no: 0,
                product_id: None,
                sku: Some("CEM-25".into()),
                description: "Saco de cemento 25kg".into(),
                quantity: 4_000,
                unit_price: price,
                discount_bp: 0,
                tax_rate_bp: 2_100,
            }],
            project_id: None,
            warehouse_id: None,
            notes: None,
        }
    }

    fn run(note: &mut DeliveryNote, cmd: DeliveryNoteCommand) -> DomainResult<()> {
        for e in note.handle(&cmd)? {
            note.apply(&e);
        }
        Ok(())
    }

    pub(crate) fn delivered(t: TenantId, number: &str, customer_name: &str) -> DeliveryNote {
        let id = DeliveryNoteId::generate();
        let mut note = DeliveryNote::empty(id);
        run(
            &mut note,
            DeliveryNoteCommand::Create(CreateDeliveryNote {
                tenant_id: t,
                delivery_note_id: id,
                number: number.into(),
                details: details(customer_name, 6_50),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        run(
            &mut note,
            DeliveryNoteCommand::Deliver(DeliverNote {
                tenant_id: t,
                delivery_note_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        note
    }

    #[test]
    fn totals_are_computed_on_create() {
        let note = delivered(TenantId::new(), "ALB2026-00001", "Construcciones Sur");
        assert_eq!(note.totals().base, 26_00);
        assert_eq!(note.totals().tax, 5_46);
        assert_eq!(note.details().lines[0].line_no, 1);
        assert_eq!(note.status(), DeliveryNoteStatus::Delivered);
    }

    #[test]
    fn only_drafts_are_edited_or_deleted() {
        let t = TenantId::new();
        let mut note = delivered(t, "ALB2026-00001", "Construcciones Sur");
        let id = note.id_typed();
        let err = run(
            &mut note,
            DeliveryNoteCommand::Update(UpdateDeliveryNote {
                tenant_id: t,
                delivery_note_id: id,
                details: details("Construcciones Sur", 7_00),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let err = run(
            &mut note,
            DeliveryNoteCommand::Delete(DeleteDeliveryNote {
                tenant_id: t,
                delivery_note_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn invoicing_and_release() {
        let t = TenantId::new();
        let mut note = delivered(t, "ALB2026-00001", "Construcciones Sur");
        let id = note.id_typed();
        let invoice = AggregateId::new();

        run(
            &mut note,
            DeliveryNoteCommand::MarkInvoiced(MarkNoteInvoiced {
                tenant_id: t,
                delivery_note_id: id,
                invoice_id: invoice,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(note.status(), DeliveryNoteStatus::Invoiced);

        let err = run(
            &mut note,
            DeliveryNoteCommand::Cancel(CancelDeliveryNote {
                tenant_id: t,
                delivery_note_id: id,
                reason: "error".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DomainError::invariant("cannot move from 'invoiced' to 'cancelled'")
        );

        run(
            &mut note,
            DeliveryNoteCommand::ReleaseFromInvoice(ReleaseNoteFromInvoice {
                tenant_id: t,
                delivery_note_id: id,
                invoice_id: invoice,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(note.status(), DeliveryNoteStatus::Delivered);
        assert_eq!(note.invoice_id(), None);
    }
}
