use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{bounded_quantity, optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, Lifecycle,
    TenantId, UserId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

gestiona_core::aggregate_id_newtype!(
    /// Warehouse transfer (traspaso) identifier.
    TransferId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    PendingShipment,
    InTransit,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl Lifecycle for TransferStatus {
    fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Draft => "draft",
            TransferStatus::PendingShipment => "pending_shipment",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::PartiallyReceived => "partially_received",
            TransferStatus::Received => "received",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    fn successors(self) -> &'static [Self] {
        use TransferStatus::*;
        match self {
            Draft => &[PendingShipment, Cancelled],
            PendingShipment => &[InTransit, Cancelled],
            InTransit => &[PartiallyReceived, Received, Cancelled],
            PartiallyReceived => &[PartiallyReceived, Received],
            Received | Cancelled => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLineInput {
    pub product_id: AggregateId,
    pub product_name: String,
    pub requested: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub line_no: u32,
    pub product_id: AggregateId,
    pub product_name: String,
    pub requested: i64,
    pub shipped: i64,
    pub received: i64,
}

impl TransferLine {
    pub fn pending_reception(&self) -> i64 {
        self.shipped - self.received
    }
}

/// Quantity addressed to one line by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantity {
    pub line_no: u32,
    pub quantity: i64,
}

/// Who did something, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAudit {
    pub created: Option<Stamp>,
    pub confirmed: Option<Stamp>,
    pub shipped: Option<Stamp>,
    pub received: Option<Stamp>,
    pub cancelled: Option<Stamp>,
}

/// Aggregate root: Transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    id: TransferId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    number: String,
    origin_warehouse_id: AggregateId,
    destination_warehouse_id: AggregateId,
    lines: Vec<TransferLine>,
    notes: Option<String>,
    status: TransferStatus,
    audit: TransferAudit,
    cancellation_reason: Option<String>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl Transfer {
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            origin_warehouse_id: AggregateId::nil(),
            destination_warehouse_id: AggregateId::nil(),
            lines: Vec::new(),
            notes: None,
            status: TransferStatus::Draft,
            audit: TransferAudit::default(),
            cancellation_reason: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn origin_warehouse_id(&self) -> AggregateId {
        self.origin_warehouse_id
    }

    pub fn destination_warehouse_id(&self) -> AggregateId {
        self.destination_warehouse_id
    }

    pub fn lines(&self) -> &[TransferLine] {
        &self.lines
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn audit(&self) -> &TransferAudit {
        &self.audit
    }

    fn line(&self, line_no: u32) -> DomainResult<&TransferLine> {
        self.lines
            .iter()
            .find(|l| l.line_no == line_no)
            .ok_or_else(|| DomainError::validation(format!("line {line_no} does not exist")))
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub number: String,
    pub origin_warehouse_id: AggregateId,
    pub destination_warehouse_id: AggregateId,
    pub lines: Vec<TransferLineInput>,
    pub notes: Option<String>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub origin_warehouse_id: AggregateId,
    pub destination_warehouse_id: AggregateId,
    pub lines: Vec<TransferLineInput>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmShipment.
///
/// `shipped` overrides the shipped quantity of the listed lines; other lines
/// ship the requested quantity. `available` is the origin warehouse's stock on
/// hand per product, looked up by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmShipment {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub shipped: Vec<LineQuantity>,
    pub available: BTreeMap<AggregateId, i64>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmReception. Unlisted lines receive everything still pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReception {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub received: Vec<LineQuantity>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub reason: String,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTransfer {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Create(CreateTransfer),
    Update(UpdateTransfer),
    Confirm(ConfirmTransfer),
    ConfirmShipment(ConfirmShipment),
    ConfirmReception(ConfirmReception),
    Cancel(CancelTransfer),
    Delete(DeleteTransfer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub number: String,
    pub origin_warehouse_id: AggregateId,
    pub destination_warehouse_id: AggregateId,
    pub lines: Vec<TransferLine>,
    pub notes: Option<String>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUpdated {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub origin_warehouse_id: AggregateId,
    pub destination_warehouse_id: AggregateId,
    pub lines: Vec<TransferLine>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfirmed {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferShipped. `shipped` covers every line, zero included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferShipped {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub shipped: Vec<LineQuantity>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferReceived. `received` holds the quantities of this reception only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceived {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub received: Vec<LineQuantity>,
    pub status: TransferStatus,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCancelled. `returned` is the stock going back to the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub reason: String,
    pub returned: Vec<LineQuantity>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDeleted {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferCreated(TransferCreated),
    TransferUpdated(TransferUpdated),
    TransferConfirmed(TransferConfirmed),
    TransferShipped(TransferShipped),
    TransferReceived(TransferReceived),
    TransferCancelled(TransferCancelled),
    TransferDeleted(TransferDeleted),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferCreated(_) => "inventory.transfer.created",
            TransferEvent::TransferUpdated(_) => "inventory.transfer.updated",
            TransferEvent::TransferConfirmed(_) => "inventory.transfer.confirmed",
            TransferEvent::TransferShipped(_) => "inventory.transfer.shipped",
            TransferEvent::TransferReceived(_) => "inventory.transfer.received",
            TransferEvent::TransferCancelled(_) => "inventory.transfer.cancelled",
            TransferEvent::TransferDeleted(_) => "inventory.transfer.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferCreated(e) => e.occurred_at,
            TransferEvent::TransferUpdated(e) => e.occurred_at,
            TransferEvent::TransferConfirmed(e) => e.occurred_at,
            TransferEvent::TransferShipped(e) => e.occurred_at,
            TransferEvent::TransferReceived(e) => e.occurred_at,
            TransferEvent::TransferCancelled(e) => e.occurred_at,
            TransferEvent::TransferDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for TransferEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            TransferEvent::TransferCreated(e) => e.tenant_id,
            TransferEvent::TransferUpdated(e) => e.tenant_id,
            TransferEvent::TransferConfirmed(e) => e.tenant_id,
            TransferEvent::TransferShipped(e) => e.tenant_id,
            TransferEvent::TransferReceived(e) => e.tenant_id,
            TransferEvent::TransferCancelled(e) => e.tenant_id,
            TransferEvent::TransferDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferCreated(e) => {
                self.id = e.transfer_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.origin_warehouse_id = e.origin_warehouse_id;
                self.destination_warehouse_id = e.destination_warehouse_id;
                self.lines = e.lines.clone();
                self.notes = e.notes.clone();
                self.status = TransferStatus::Draft;
                self.audit.created = Some(Stamp { by: e.by, at: e.occurred_at });
                self.created = true;
            }
            TransferEvent::TransferUpdated(e) => {
                self.origin_warehouse_id = e.origin_warehouse_id;
                self.destination_warehouse_id = e.destination_warehouse_id;
                self.lines = e.lines.clone();
                self.notes = e.notes.clone();
            }
            TransferEvent::TransferConfirmed(e) => {
                self.status = TransferStatus::PendingShipment;
                self.audit.confirmed = Some(Stamp { by: e.by, at: e.occurred_at });
            }
            TransferEvent::TransferShipped(e) => {
                for q in &e.shipped {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == q.line_no) {
                        line.shipped = q.quantity;
                    }
                }
                self.status = TransferStatus::InTransit;
                self.audit.shipped = Some(Stamp { by: e.by, at: e.occurred_at });
            }
            TransferEvent::TransferReceived(e) => {
                for q in &e.received {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == q.line_no) {
                        line.received += q.quantity;
                    }
                }
                self.status = e.status;
                self.audit.received = Some(Stamp { by: e.by, at: e.occurred_at });
            }
            TransferEvent::TransferCancelled(e) => {
                self.status = TransferStatus::Cancelled;
                self.cancellation_reason = Some(e.reason.clone());
                self.audit.cancelled = Some(Stamp { by: e.by, at: e.occurred_at });
            }
            TransferEvent::TransferDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Create(cmd) => self.handle_create(cmd),
            TransferCommand::Update(cmd) => self.handle_update(cmd),
            TransferCommand::Confirm(cmd) => self.handle_confirm(cmd),
            TransferCommand::ConfirmShipment(cmd) => self.handle_ship(cmd),
            TransferCommand::ConfirmReception(cmd) => self.handle_receive(cmd),
            TransferCommand::Cancel(cmd) => self.handle_cancel(cmd),
            TransferCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl AggregateKind for Transfer {
    const AGGREGATE_TYPE: &'static str = "inventory.transfer";

    fn empty(id: AggregateId) -> Self {
        Transfer::empty(TransferId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

fn build_lines(
    origin: AggregateId,
    destination: AggregateId,
    input: &[TransferLineInput],
) -> DomainResult<Vec<TransferLine>> {
    if origin == destination {
        return Err(DomainError::validation(
            "origin and destination warehouses must differ",
        ));
    }
    if input.is_empty() {
        return Err(DomainError::validation("a transfer needs at least one line"));
    }
    let mut seen = BTreeSet::new();
    input
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if line.requested <= 0 {
                return Err(DomainError::validation(format!(
                    "line {}: requested quantity must be positive",
                    i + 1
                )));
            }
            bounded_quantity(&format!("line {} requested quantity", i + 1), line.requested)?;
            if !seen.insert(line.product_id) {
                return Err(DomainError::validation(format!(
                    "line {}: product appears more than once",
                    i + 1
                )));
            }
            Ok(TransferLine {
                line_no: i as u32 + 1,
                product_id: line.product_id,
                product_name: required_text("product_name", &line.product_name)?,
                requested: line.requested,
                shipped: 0,
                received: 0,
            })
        })
        .collect()
}

impl Transfer {
    fn ensure_live(&self, tenant_id: TenantId, transfer_id: TransferId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != transfer_id {
            return Err(DomainError::invariant("transfer_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, action: &str) -> DomainResult<()> {
        if self.status != TransferStatus::Draft {
            return Err(DomainError::invariant(format!(
                "only draft transfers can be {action} (status is '{}')",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> DomainResult<Vec<TransferEvent>> {
        if self.created {
            return Err(DomainError::conflict("transfer already exists"));
        }
        let number = required_text("number", &cmd.number)?;
        let lines = build_lines(cmd.origin_warehouse_id, cmd.destination_warehouse_id, &cmd.lines)?;
        Ok(vec![TransferEvent::TransferCreated(TransferCreated {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            number,
            origin_warehouse_id: cmd.origin_warehouse_id,
            destination_warehouse_id: cmd.destination_warehouse_id,
            lines,
            notes: optional_text(cmd.notes.as_deref()),
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateTransfer) -> DomainResult<Vec<TransferEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.transfer_id)?;
        self.ensure_draft("edited")?;
        let lines = build_lines(cmd.origin_warehouse_id, cmd.destination_warehouse_id, &cmd.lines)?;
        Ok(vec![TransferEvent::TransferUpdated(TransferUpdated {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            origin_warehouse_id: cmd.origin_warehouse_id,
            destination_warehouse_id: cmd.destination_warehouse_id,
            lines,
            notes: optional_text(cmd.notes.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmTransfer) -> DomainResult<Vec<TransferEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.transfer_id)?;
        ensure_transition(self.status, TransferStatus::PendingShipment)?;
        Ok(vec![TransferEvent::TransferConfirmed(TransferConfirmed {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ConfirmShipment) -> DomainResult<Vec<TransferEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.transfer_id)?;
        ensure_transition(self.status, TransferStatus::InTransit)?;

        for q in &cmd.shipped {
            self.line(q.line_no)?;
        }

        let mut shipped = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let quantity = cmd
                .shipped
                .iter()
                .find(|q| q.line_no == line.line_no)
                .map(|q| q.quantity)
                .unwrap_or(line.requested);
            if quantity < 0 || quantity > line.requested {
                return Err(DomainError::validation(format!(
                    "line {}: shipped quantity must be between 0 and {}",
                    line.line_no, line.requested
                )));
            }
            let on_hand = cmd.available.get(&line.product_id).copied().unwrap_or(0);
            if quantity > on_hand {
                return Err(DomainError::invariant(format!(
                    "insufficient stock of '{}' in origin warehouse: {on_hand} available, {quantity} to ship",
                    line.product_name
                )));
            }
            shipped.push(LineQuantity {
                line_no: line.line_no,
                quantity,
            });
        }

        if shipped.iter().all(|q| q.quantity == 0) {
            return Err(DomainError::validation("nothing to ship"));
        }

        Ok(vec![TransferEvent::TransferShipped(TransferShipped {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            shipped,
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ConfirmReception) -> DomainResult<Vec<TransferEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.transfer_id)?;
        if !matches!(
            self.status,
            TransferStatus::InTransit | TransferStatus::PartiallyReceived
        ) {
            return Err(DomainError::invariant(format!(
                "cannot receive a transfer in status '{}'",
                self.status.as_str()
            )));
        }

        for q in &cmd.received {
            self.line(q.line_no)?;
        }

        let mut received = Vec::new();
        let mut complete = true;
        for line in &self.lines {
            let quantity = cmd
                .received
                .iter()
                .find(|q| q.line_no == line.line_no)
                .map(|q| q.quantity)
                .unwrap_or(line.pending_reception());
            if quantity < 0 {
                return Err(DomainError::validation(format!(
                    "line {}: received quantity cannot be negative",
                    line.line_no
                )));
            }
            let total_received = line
                .received
                .checked_add(quantity)
                .filter(|total| *total <= line.shipped)
                .ok_or_else(|| {
                    DomainError::invariant(format!(
                        "line {}: cannot be received for more than was shipped ({})",
                        line.line_no, line.shipped
                    ))
                })?;
            if total_received < line.shipped {
                complete = false;
            }
            if quantity > 0 {
                received.push(LineQuantity {
                    line_no: line.line_no,
                    quantity,
                });
            }
        }

        if received.is_empty() {
            return Err(DomainError::validation("nothing to receive"));
        }

        let status = if complete {
            TransferStatus::Received
        } else {
            TransferStatus::PartiallyReceived
        };
        ensure_transition(self.status, status)?;

        Ok(vec![TransferEvent::TransferReceived(TransferReceived {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            received,
            status,
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelTransfer) -> DomainResult<Vec<TransferEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.transfer_id)?;
        let reason = required_text("reason", &cmd.reason)?;
        if self.lines.iter().any(|l| l.received > 0) {
            return Err(DomainError::invariant(
                "a transfer with received goods cannot be cancelled",
            ));
        }
        ensure_transition(self.status, TransferStatus::Cancelled)?;

        let returned = if self.status == TransferStatus::InTransit {
            self.lines
                .iter()
                .filter(|l| l.shipped > 0)
                .map(|l| LineQuantity {
                    line_no: l.line_no,
                    quantity: l.shipped,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(vec![TransferEvent::TransferCancelled(TransferCancelled {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            reason,
            returned,
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteTransfer) -> DomainResult<Vec<TransferEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.transfer_id)?;
        self.ensure_draft("deleted")?;
        Ok(vec![TransferEvent::TransferDeleted(TransferDeleted {
            tenant_id: cmd.tenant_id,
            transfer_id: cmd.transfer_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tenant_id: TenantId,
        user: UserId,
        screws: AggregateId,
        nuts: AggregateId,
        transfer: Transfer,
    }

    fn run(transfer: &mut Transfer, cmd: TransferCommand) -> DomainResult<Vec<TransferEvent>> {
        let events = transfer.handle(&cmd)?;
        for e in &events {
            transfer.apply(e);
        }
        Ok(events)
    }

    fn draft() -> Fixture {
        let tenant_id = TenantId::new();
        let user = UserId::new();
        let (screws, nuts) = (AggregateId::new(), AggregateId::new());
        let id = TransferId::generate();
        let mut transfer = Transfer::empty(id);
        run(
            &mut transfer,
            TransferCommand::Create(CreateTransfer {
                tenant_id,
                transfer_id: id,
                number: "TRA2026-00001".into(),
                origin_warehouse_id: AggregateId::new(),
                destination_warehouse_id: AggregateId::new(),
                lines: vec![
                    TransferLineInput {
                        product_id: screws,
                        product_name: "Tornillos".into(),
                        requested: 10,
                    },
                    TransferLineInput {
                        product_id: nuts,
                        product_name: "Tuercas".into(),
                        requested: 4,
                    },
                ],
                notes: None,
                by: user,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        Fixture {
            tenant_id,
            user,
            screws,
            nuts,
            transfer,
        }
    }

    fn confirm(f: &mut Fixture) {
        let cmd = TransferCommand::Confirm(ConfirmTransfer {
            tenant_id: f.tenant_id,
            transfer_id: f.transfer.id_typed(),
            by: f.user,
            occurred_at: Utc::now(),
        });
        run(&mut f.transfer, cmd).unwrap();
    }

    fn ship(f: &mut Fixture, shipped: Vec<LineQuantity>, stock: i64) -> DomainResult<Vec<TransferEvent>> {
        let available = BTreeMap::from([(f.screws, stock), (f.nuts, stock)]);
        let cmd = TransferCommand::ConfirmShipment(ConfirmShipment {
            tenant_id: f.tenant_id,
            transfer_id: f.transfer.id_typed(),
            shipped,
            available,
            by: f.user,
            occurred_at: Utc::now(),
        });
        run(&mut f.transfer, cmd)
    }

    fn receive(f: &mut Fixture, received: Vec<LineQuantity>) -> DomainResult<Vec<TransferEvent>> {
        let cmd = TransferCommand::ConfirmReception(ConfirmReception {
            tenant_id: f.tenant_id,
            transfer_id: f.transfer.id_typed(),
            received,
            by: f.user,
            occurred_at: Utc::now(),
        });
        run(&mut f.transfer, cmd)
    }

    fn cancel(f: &mut Fixture, reason: &str) -> DomainResult<Vec<TransferEvent>> {
        let cmd = TransferCommand::Cancel(CancelTransfer {
            tenant_id: f.tenant_id,
            transfer_id: f.transfer.id_typed(),
            reason: reason.into(),
            by: f.user,
            occurred_at: Utc::now(),
        });
        run(&mut f.transfer, cmd)
    }

    #[test]
    fn same_warehouse_is_rejected() {
        let w = AggregateId::new();
        let err = build_lines(w, w, &[]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("must differ")));
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let p = AggregateId::new();
        let line = TransferLineInput {
            product_id: p,
            product_name: "X".into(),
            requested: 1,
        };
        let err = build_lines(AggregateId::new(), AggregateId::new(), &[line.clone(), line]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("more than once")));
    }

    #[test]
    fn oversized_request_is_rejected() {
        let line = TransferLineInput {
            product_id: AggregateId::new(),
            product_name: "Arena".into(),
            requested: i64::MAX,
        };
        let err = build_lines(AggregateId::new(), AggregateId::new(), &[line]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("requested quantity")));
    }

    #[test]
    fn cannot_ship_a_draft() {
        let mut f = draft();
        let err = ship(&mut f, vec![], 100).unwrap_err();
        assert_eq!(err, DomainError::invariant("cannot move from 'draft' to 'in_transit'"));
    }

    #[test]
    fn shipment_defaults_to_requested_and_checks_stock() {
        let mut f = draft();
        confirm(&mut f);

        let err = ship(&mut f, vec![], 5).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("insufficient stock of 'Tornillos'")));

        ship(&mut f, vec![], 100).unwrap();
        assert_eq!(f.transfer.status(), TransferStatus::InTransit);
        assert_eq!(f.transfer.lines()[0].shipped, 10);
        assert_eq!(f.transfer.lines()[1].shipped, 4);
        assert!(f.transfer.audit().shipped.is_some());
    }

    #[test]
    fn shipped_cannot_exceed_requested() {
        let mut f = draft();
        confirm(&mut f);
        let err = ship(&mut f, vec![LineQuantity { line_no: 2, quantity: 5 }], 100).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn partial_then_full_reception() {
        let mut f = draft();
        confirm(&mut f);
        ship(&mut f, vec![LineQuantity { line_no: 2, quantity: 0 }], 100).unwrap();

        receive(&mut f, vec![LineQuantity { line_no: 1, quantity: 6 }]).unwrap();
        assert_eq!(f.transfer.status(), TransferStatus::PartiallyReceived);

        let err = receive(&mut f, vec![LineQuantity { line_no: 1, quantity: 5 }]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("more than was shipped")));
        let err = receive(&mut f, vec![LineQuantity { line_no: 1, quantity: i64::MAX }]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("more than was shipped")));

        let events = receive(&mut f, vec![]).unwrap();
        match &events[0] {
            TransferEvent::TransferReceived(e) => {
                assert_eq!(e.received, vec![LineQuantity { line_no: 1, quantity: 4 }]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(f.transfer.status(), TransferStatus::Received);
    }

    #[test]
    fn cancel_in_transit_returns_shipped_stock() {
        let mut f = draft();
        confirm(&mut f);
        ship(&mut f, vec![LineQuantity { line_no: 1, quantity: 7 }], 100).unwrap();

        assert!(matches!(cancel(&mut f, "  "), Err(DomainError::Validation(_))));

        let events = cancel(&mut f, "Camión averiado").unwrap();
        match &events[0] {
            TransferEvent::TransferCancelled(e) => {
                assert_eq!(
                    e.returned,
                    vec![
                        LineQuantity { line_no: 1, quantity: 7 },
                        LineQuantity { line_no: 2, quantity: 4 },
                    ]
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(f.transfer.status().is_terminal());
    }

    #[test]
    fn cannot_cancel_after_reception() {
        let mut f = draft();
        confirm(&mut f);
        ship(&mut f, vec![], 100).unwrap();
        receive(&mut f, vec![LineQuantity { line_no: 1, quantity: 1 }]).unwrap();
        let err = cancel(&mut f, "error").unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("received goods")));
    }

    #[test]
    fn delete_only_in_draft() {
        let mut f = draft();
        confirm(&mut f);
        let cmd = TransferCommand::Delete(DeleteTransfer {
            tenant_id: f.tenant_id,
            transfer_id: f.transfer.id_typed(),
            occurred_at: Utc::now(),
        });
        let err = run(&mut f.transfer, cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.starts_with("only draft transfers can be deleted")));
    }
}
