use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{bounded_amount, optional_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, Lifecycle,
    TenantId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

use crate::layout::{Capacity, Dimensions, Position, TableShape};
use crate::salon::SalonId;

gestiona_core::aggregate_id_newtype!(
    /// Table (mesa) identifier.
    TableId
);

/// Live status of a table during service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Free,
    Occupied,
    Reserved,
    BillRequested,
    ToClean,
    OutOfService,
}

impl Lifecycle for TableStatus {
    fn as_str(self) -> &'static str {
        match self {
            TableStatus::Free => "free",
            TableStatus::Occupied => "occupied",
            TableStatus::Reserved => "reserved",
            TableStatus::BillRequested => "bill_requested",
            TableStatus::ToClean => "to_clean",
            TableStatus::OutOfService => "out_of_service",
        }
    }

    fn successors(self) -> &'static [Self] {
        use TableStatus::*;
        match self {
            Free => &[Occupied, Reserved, ToClean, OutOfService],
            Reserved => &[Occupied, Free, OutOfService],
            // occupied → occupied refreshes the occupancy (guests, pending amount)
            Occupied => &[Occupied, BillRequested, ToClean, Free],
            BillRequested => &[Occupied, ToClean, Free],
            ToClean => &[Free, OutOfService],
            OutOfService => &[Free],
        }
    }
}

impl TableStatus {
    pub fn holds_guests(self) -> bool {
        matches!(self, TableStatus::Occupied | TableStatus::BillRequested)
    }
}

/// Attributes edited from the floor-plan editor and the table form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDetails {
    pub salon_id: SalonId,
    pub number: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub shape: TableShape,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub capacity: Capacity,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

impl TableDetails {
    pub fn normalized(mut self) -> DomainResult<Self> {
        if self.number == 0 {
            return Err(DomainError::validation("table number must be positive"));
        }
        self.name = optional_text(self.name.as_deref());
        self.notes = optional_text(self.notes.as_deref());
        self.position = self.position.normalized();
        self.dimensions.validate()?;
        self.capacity.validate()?;
        Ok(self)
    }
}

/// Occupancy data supplied when seating guests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyInput {
    pub guests: u32,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub waiter_id: Option<String>,
    /// Amount still to be charged, in cents.
    #[serde(default)]
    pub pending_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub guests: u32,
    pub order_id: Option<String>,
    pub waiter_id: Option<String>,
    pub pending_amount: u64,
    pub since: DateTime<Utc>,
}

/// Membership of a merged group of tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGroup {
    pub group_id: AggregateId,
    pub main_table_id: TableId,
    pub member_ids: Vec<TableId>,
    /// Sum of the members' maximum capacity.
    pub capacity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub times_occupied: u64,
    pub total_guests: u64,
    pub total_revenue: u64,
    pub minutes_occupied: u64,
    pub last_occupied_at: Option<DateTime<Utc>>,
}

/// Occupancy folded into stats when guests leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedOccupancy {
    pub guests: u32,
    pub revenue: u64,
    pub minutes: u64,
}

/// Aggregate root: Table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    id: TableId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    #[serde(flatten)]
    details: TableDetails,
    status: TableStatus,
    status_changed_at: Option<DateTime<Utc>>,
    occupancy: Option<Occupancy>,
    group: Option<TableGroup>,
    stats: TableStats,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl Table {
    pub fn empty(id: TableId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: TableDetails {
                salon_id: SalonId::new(AggregateId::nil()),
                number: 0,
                name: None,
                shape: TableShape::default(),
                position: Position::default(),
                dimensions: Dimensions::default(),
                capacity: Capacity::default(),
                active: true,
                notes: None,
            },
            status: TableStatus::Free,
            status_changed_at: None,
            occupancy: None,
            group: None,
            stats: TableStats::default(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> TableId {
        self.id
    }

    pub fn details(&self) -> &TableDetails {
        &self.details
    }

    pub fn salon_id(&self) -> SalonId {
        self.details.salon_id
    }

    pub fn number(&self) -> u32 {
        self.details.number
    }

    pub fn status(&self) -> TableStatus {
        self.status
    }

    pub fn occupancy(&self) -> Option<&Occupancy> {
        self.occupancy.as_ref()
    }

    pub fn group(&self) -> Option<&TableGroup> {
        self.group.as_ref()
    }

    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    /// Seats available to a party: the group's when merged.
    pub fn seating_capacity(&self) -> u32 {
        self.group
            .as_ref()
            .map(|g| g.capacity)
            .unwrap_or(self.details.capacity.max)
    }
}

impl AggregateRoot for Table {
    type Id = TableId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTable {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub details: TableDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTable {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub details: TableDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MoveTable (drag/rotate/resize in the editor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTable {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub position: Position,
    pub dimensions: Option<Dimensions>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTableStatus {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub status: TableStatus,
    pub occupancy: Option<OccupancyInput>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTableGroup {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub group: TableGroup,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveTableGroup {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTable {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableCommand {
    Create(CreateTable),
    Update(UpdateTable),
    Move(MoveTable),
    ChangeStatus(ChangeTableStatus),
    JoinGroup(JoinTableGroup),
    LeaveGroup(LeaveTableGroup),
    Delete(DeleteTable),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCreated {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub details: TableDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableUpdated {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub details: TableDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMoved {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub position: Position,
    pub dimensions: Dimensions,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatusChanged {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub from: TableStatus,
    pub to: TableStatus,
    pub occupancy: Option<Occupancy>,
    pub released: Option<ReleasedOccupancy>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGrouped {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub group: TableGroup,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableUngrouped {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub group_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDeleted {
    pub tenant_id: TenantId,
    pub table_id: TableId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableEvent {
    TableCreated(TableCreated),
    TableUpdated(TableUpdated),
    TableMoved(TableMoved),
    TableStatusChanged(TableStatusChanged),
    TableGrouped(TableGrouped),
    TableUngrouped(TableUngrouped),
    TableDeleted(TableDeleted),
}

impl Event for TableEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TableEvent::TableCreated(_) => "restaurant.table.created",
            TableEvent::TableUpdated(_) => "restaurant.table.updated",
            TableEvent::TableMoved(_) => "restaurant.table.moved",
            TableEvent::TableStatusChanged(_) => "restaurant.table.status_changed",
            TableEvent::TableGrouped(_) => "restaurant.table.grouped",
            TableEvent::TableUngrouped(_) => "restaurant.table.ungrouped",
            TableEvent::TableDeleted(_) => "restaurant.table.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TableEvent::TableCreated(e) => e.occurred_at,
            TableEvent::TableUpdated(e) => e.occurred_at,
            TableEvent::TableMoved(e) => e.occurred_at,
            TableEvent::TableStatusChanged(e) => e.occurred_at,
            TableEvent::TableGrouped(e) => e.occurred_at,
            TableEvent::TableUngrouped(e) => e.occurred_at,
            TableEvent::TableDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for TableEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            TableEvent::TableCreated(e) => e.tenant_id,
            TableEvent::TableUpdated(e) => e.tenant_id,
            TableEvent::TableMoved(e) => e.tenant_id,
            TableEvent::TableStatusChanged(e) => e.tenant_id,
            TableEvent::TableGrouped(e) => e.tenant_id,
            TableEvent::TableUngrouped(e) => e.tenant_id,
            TableEvent::TableDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Table {
    type Command = TableCommand;
    type Event = TableEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TableEvent::TableCreated(e) => {
                self.id = e.table_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.status = TableStatus::Free;
                self.status_changed_at = Some(e.occurred_at);
                self.created = true;
            }
            TableEvent::TableUpdated(e) => {
                self.details = e.details.clone();
            }
            TableEvent::TableMoved(e) => {
                self.details.position = e.position;
                self.details.dimensions = e.dimensions;
            }
            TableEvent::TableStatusChanged(e) => {
                self.status = e.to;
                self.status_changed_at = Some(e.occurred_at);
                self.occupancy = e.occupancy.clone();
                if let Some(released) = &e.released {
                    let stats = &mut self.stats;
                    stats.times_occupied = stats.times_occupied.saturating_add(1);
                    stats.total_guests = stats.total_guests.saturating_add(u64::from(released.guests));
                    stats.total_revenue = stats.total_revenue.saturating_add(released.revenue);
                    stats.minutes_occupied = stats.minutes_occupied.saturating_add(released.minutes);
                    self.stats.last_occupied_at = Some(e.occurred_at);
                }
            }
            TableEvent::TableGrouped(e) => {
                self.group = Some(e.group.clone());
            }
            TableEvent::TableUngrouped(_) => {
                self.group = None;
            }
            TableEvent::TableDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TableCommand::Create(cmd) => self.handle_create(cmd),
            TableCommand::Update(cmd) => self.handle_update(cmd),
            TableCommand::Move(cmd) => self.handle_move(cmd),
            TableCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            TableCommand::JoinGroup(cmd) => self.handle_join_group(cmd),
            TableCommand::LeaveGroup(cmd) => self.handle_leave_group(cmd),
            TableCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl AggregateKind for Table {
    const AGGREGATE_TYPE: &'static str = "restaurant.table";

    fn empty(id: AggregateId) -> Self {
        Table::empty(TableId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl Table {
    fn ensure_live(&self, tenant_id: TenantId, table_id: TableId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != table_id {
            return Err(DomainError::invariant("table_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTable) -> DomainResult<Vec<TableEvent>> {
        if self.created {
            return Err(DomainError::conflict("table already exists"));
        }
        let details = cmd.details.clone().normalized()?;
        Ok(vec![TableEvent::TableCreated(TableCreated {
            tenant_id: cmd.tenant_id,
            table_id: cmd.table_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateTable) -> DomainResult<Vec<TableEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.table_id)?;
        let details = cmd.details.clone().normalized()?;
        if details.salon_id != self.details.salon_id && self.group.is_some() {
            return Err(DomainError::invariant(
                "a grouped table cannot be moved to another salon",
            ));
        }
        if !details.active && self.status.holds_guests() {
            return Err(DomainError::invariant(
                "cannot deactivate a table with guests seated",
            ));
        }
        if details == self.details {
            return Ok(vec![]);
        }
        Ok(vec![TableEvent::TableUpdated(TableUpdated {
            tenant_id: cmd.tenant_id,
            table_id: cmd.table_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_move(&self, cmd: &MoveTable) -> DomainResult<Vec<TableEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.table_id)?;
        let dimensions = cmd.dimensions.unwrap_or(self.details.dimensions);
        dimensions.validate()?;
        let position = cmd.position.normalized();
        if position == self.details.position && dimensions == self.details.dimensions {
            return Ok(vec![]);
        }
        Ok(vec![TableEvent::TableMoved(TableMoved {
            tenant_id: cmd.tenant_id,
            table_id: cmd.table_id,
            position,
            dimensions,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeTableStatus) -> DomainResult<Vec<TableEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.table_id)?;
        let from = self.status;
        let to = cmd.status;
        ensure_transition(from, to)?;

        if matches!(to, TableStatus::Occupied | TableStatus::Reserved) && !self.details.active {
            return Err(DomainError::invariant("table is not active"));
        }

        let occupancy = match to {
            TableStatus::Occupied => Some(self.seat(cmd)?),
            TableStatus::BillRequested => {
                let mut current = self
                    .occupancy
                    .clone()
                    .ok_or_else(|| DomainError::invariant("table has no occupancy"))?;
                if let Some(input) = &cmd.occupancy {
                    current.pending_amount = input.pending_amount;
                }
                Some(current)
            }
            _ => None,
        };

        let released = match (&self.occupancy, from.holds_guests() && !to.holds_guests()) {
            (Some(current), true) => Some(ReleasedOccupancy {
                guests: current.guests,
                revenue: current.pending_amount,
                minutes: (cmd.occurred_at - current.since).num_minutes().max(0) as u64,
            }),
            _ => None,
        };

        Ok(vec![TableEvent::TableStatusChanged(TableStatusChanged {
            tenant_id: cmd.tenant_id,
            table_id: cmd.table_id,
            from,
            to,
            occupancy,
            released,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn seat(&self, cmd: &ChangeTableStatus) -> DomainResult<Occupancy> {
        let input = cmd
            .occupancy
            .as_ref()
            .ok_or_else(|| DomainError::validation("occupancy is required to occupy a table"))?;
        if input.guests == 0 {
            return Err(DomainError::validation("guests must be at least 1"));
        }
        bounded_amount("pending amount", input.pending_amount)?;
        let seats = self.seating_capacity();
        if input.guests > seats {
            return Err(DomainError::invariant(format!(
                "{} guests exceed the capacity of {seats}",
                input.guests
            )));
        }
        // Refreshing an occupied table keeps the original seating time.
        let since = self
            .occupancy
            .as_ref()
            .filter(|_| self.status.holds_guests())
            .map(|o| o.since)
            .unwrap_or(cmd.occurred_at);
        Ok(Occupancy {
            guests: input.guests,
            order_id: optional_text(input.order_id.as_deref()),
            waiter_id: optional_text(input.waiter_id.as_deref()),
            pending_amount: input.pending_amount,
            since,
        })
    }

    fn handle_join_group(&self, cmd: &JoinTableGroup) -> DomainResult<Vec<TableEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.table_id)?;
        if self.group.is_some() {
            return Err(DomainError::invariant(format!(
                "table {} is already grouped",
                self.details.number
            )));
        }
        if self.status == TableStatus::OutOfService {
            return Err(DomainError::invariant(format!(
                "table {} is out of service",
                self.details.number
            )));
        }
        if !cmd.group.member_ids.contains(&self.id) {
            return Err(DomainError::invariant("table is not a member of the group"));
        }
        Ok(vec![TableEvent::TableGrouped(TableGrouped {
            tenant_id: cmd.tenant_id,
            table_id: cmd.table_id,
            group: cmd.group.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_leave_group(&self, cmd: &LeaveTableGroup) -> DomainResult<Vec<TableEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.table_id)?;
        let group = self
            .group
            .as_ref()
            .ok_or_else(|| DomainError::invariant("table is not grouped"))?;
        Ok(vec![TableEvent::TableUngrouped(TableUngrouped {
            tenant_id: cmd.tenant_id,
            table_id: cmd.table_id,
            group_id: group.group_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteTable) -> DomainResult<Vec<TableEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.table_id)?;
        if self.status.holds_guests() {
            return Err(DomainError::invariant(format!(
                "cannot delete table {} while it is {}",
                self.details.number,
                self.status.as_str()
            )));
        }
        if self.group.is_some() {
            return Err(DomainError::invariant("ungroup the table before deleting it"));
        }
        Ok(vec![TableEvent::TableDeleted(TableDeleted {
            tenant_id: cmd.tenant_id,
            table_id: cmd.table_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn details(number: u32) -> TableDetails {
        TableDetails {
            salon_id: SalonId::generate(),
            number,
            name: None,
            shape: TableShape::Round,
            position: Position { x: 100, y: 50, rotation: 0 },
            dimensions: Dimensions::default(),
            capacity: Capacity { min: 2, max: 4 },
            active: true,
            notes: None,
        }
    }

    fn run(table: &mut Table, cmd: TableCommand) -> DomainResult<()> {
        for e in table.handle(&cmd)? {
            table.apply(&e);
        }
        Ok(())
    }

    fn created(tenant_id: TenantId) -> Table {
        let id = TableId::generate();
        let mut table = Table::empty(id);
        run(
            &mut table,
            TableCommand::Create(CreateTable {
                tenant_id,
                table_id: id,
                details: details(7),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        table
    }

    fn status(
        tenant_id: TenantId,
        table_id: TableId,
        to: TableStatus,
        guests: Option<u32>,
        at: DateTime<Utc>,
    ) -> TableCommand {
        TableCommand::ChangeStatus(ChangeTableStatus {
            tenant_id,
            table_id,
            status: to,
            occupancy: guests.map(|g| OccupancyInput {
                guests: g,
                order_id: Some("T-1".into()),
                waiter_id: None,
                pending_amount: 4_550,
            }),
            occurred_at: at,
        })
    }

    fn group_for(id: TableId) -> TableGroup {
        TableGroup {
            group_id: AggregateId::new(),
            main_table_id: id,
            member_ids: vec![id, TableId::generate()],
            capacity: 8,
        }
    }

    #[test]
    fn new_table_is_free() {
        let table = created(TenantId::new());
        assert_eq!(table.status(), TableStatus::Free);
        assert_eq!(table.number(), 7);
    }

    #[test]
    fn seating_requires_occupancy_within_capacity() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        let now = Utc::now();

        let err = run(&mut table, status(tenant_id, id, TableStatus::Occupied, None, now)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = run(&mut table, status(tenant_id, id, TableStatus::Occupied, Some(5), now)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("exceed") => {}
            other => panic!("unexpected error: {other:?}"),
        }

        run(&mut table, status(tenant_id, id, TableStatus::Occupied, Some(3), now)).unwrap();
        assert_eq!(table.occupancy().unwrap().guests, 3);
    }

    #[test]
    fn inactive_table_cannot_be_seated() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        let mut inactive = table.details().clone();
        inactive.active = false;
        run(
            &mut table,
            TableCommand::Update(UpdateTable {
                tenant_id,
                table_id: id,
                details: inactive,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = run(&mut table, status(tenant_id, id, TableStatus::Reserved, None, Utc::now())).unwrap_err();
        assert_eq!(err, DomainError::invariant("table is not active"));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        let err = run(&mut table, status(tenant_id, id, TableStatus::BillRequested, None, Utc::now()))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::invariant("cannot move from 'free' to 'bill_requested'")
        );
    }

    #[test]
    fn releasing_a_table_accumulates_stats() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        let seated_at = Utc::now();

        run(&mut table, status(tenant_id, id, TableStatus::Occupied, Some(2), seated_at)).unwrap();
        // refresh keeps the seating time
        let later = seated_at + Duration::minutes(10);
        run(&mut table, status(tenant_id, id, TableStatus::Occupied, Some(3), later)).unwrap();
        assert_eq!(table.occupancy().unwrap().since, seated_at);

        let later = seated_at + Duration::minutes(50);
        run(&mut table, status(tenant_id, id, TableStatus::BillRequested, None, later)).unwrap();
        let later = seated_at + Duration::minutes(65);
        run(&mut table, status(tenant_id, id, TableStatus::ToClean, None, later)).unwrap();

        assert_eq!(table.status(), TableStatus::ToClean);
        assert!(table.occupancy().is_none());
        let stats = table.stats();
        assert_eq!(stats.times_occupied, 1);
        assert_eq!(stats.total_guests, 3);
        assert_eq!(stats.total_revenue, 4_550);
        assert_eq!(stats.minutes_occupied, 65);
    }

    #[test]
    fn cannot_delete_occupied_table() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        run(&mut table, status(tenant_id, id, TableStatus::Occupied, Some(2), Utc::now())).unwrap();

        let err = run(
            &mut table,
            TableCommand::Delete(DeleteTable {
                tenant_id,
                table_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("while it is occupied") => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn out_of_service_table_cannot_be_reserved_or_grouped() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        run(&mut table, status(tenant_id, id, TableStatus::OutOfService, None, Utc::now())).unwrap();

        assert!(run(&mut table, status(tenant_id, id, TableStatus::Reserved, None, Utc::now())).is_err());

        let err = run(
            &mut table,
            TableCommand::JoinGroup(JoinTableGroup {
                tenant_id,
                table_id: id,
                group: group_for(id),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("out of service")));
    }

    #[test]
    fn grouped_table_seats_up_to_group_capacity() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        run(
            &mut table,
            TableCommand::JoinGroup(JoinTableGroup {
                tenant_id,
                table_id: id,
                group: group_for(id),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        run(&mut table, status(tenant_id, id, TableStatus::Occupied, Some(7), Utc::now())).unwrap();
        assert_eq!(table.seating_capacity(), 8);

        run(
            &mut table,
            TableCommand::LeaveGroup(LeaveTableGroup {
                tenant_id,
                table_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(table.group().is_none());
    }

    #[test]
    fn move_normalises_rotation() {
        let tenant_id = TenantId::new();
        let mut table = created(tenant_id);
        let id = table.id_typed();
        run(
            &mut table,
            TableCommand::Move(MoveTable {
                tenant_id,
                table_id: id,
                position: Position { x: 10, y: 20, rotation: -90 },
                dimensions: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(table.details().position.rotation, 270);
    }
}
