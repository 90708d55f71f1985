use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{bounded_amount, optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, Lifecycle,
    TenantId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

gestiona_core::aggregate_id_newtype!(
    /// Machine identifier.
    MachineId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineKind {
    Vehicle,
    Tool,
    Equipment,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Available,
    InUse,
    Maintenance,
    Retired,
}

impl Lifecycle for MachineStatus {
    fn as_str(self) -> &'static str {
        match self {
            MachineStatus::Available => "available",
            MachineStatus::InUse => "in_use",
            MachineStatus::Maintenance => "maintenance",
            MachineStatus::Retired => "retired",
        }
    }

    fn successors(self) -> &'static [Self] {
        use MachineStatus::*;
        match self {
            Available => &[InUse, Maintenance, Retired],
            InUse => &[Available, Maintenance],
            Maintenance => &[Available, Retired],
            Retired => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDetails {
    pub code: String,
    pub name: String,
    pub kind: MachineKind,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub plate: Option<String>,
    /// Cents per hour of use.
    #[serde(default)]
    pub hourly_cost: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl MachineDetails {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.code = required_text("code", &self.code)?.to_uppercase();
        self.name = required_text("name", &self.name)?;
        self.hourly_cost = bounded_amount("hourly_cost", self.hourly_cost)?;
        self.brand = optional_text(self.brand.as_deref());
        self.model = optional_text(self.model.as_deref());
        self.serial_number = optional_text(self.serial_number.as_deref());
        self.plate = optional_text(self.plate.as_deref())
            .map(|p| p.replace([' ', '-'], "").to_uppercase());
        self.notes = optional_text(self.notes.as_deref());
        Ok(self)
    }
}

/// Cost of `tenths` tenths of an hour at `hourly_cost` cents, rounded half up.
pub fn usage_cost(tenths: u32, hourly_cost: u64) -> u64 {
    let cost = (u128::from(tenths) * u128::from(hourly_cost) + 5) / 10;
    u64::try_from(cost).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub date: NaiveDate,
    /// Tenths of an hour.
    pub hours: u32,
    pub project_id: Option<AggregateId>,
    pub employee_id: Option<AggregateId>,
    pub cost: u64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceEntry {
    pub date: NaiveDate,
    pub description: String,
    pub cost: u64,
}

/// Aggregate root: Machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Machine {
    id: MachineId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    #[serde(flatten)]
    details: MachineDetails,
    status: MachineStatus,
    usage_hours: u64,
    usage_log: Vec<UsageEntry>,
    maintenance_log: Vec<MaintenanceEntry>,
    next_maintenance: Option<NaiveDate>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl Machine {
    pub fn empty(id: MachineId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: MachineDetails {
                code: String::new(),
                name: String::new(),
                kind: MachineKind::Other,
                brand: None,
                model: None,
                serial_number: None,
                plate: None,
                hourly_cost: 0,
                notes: None,
            },
            status: MachineStatus::Available,
            usage_hours: 0,
            usage_log: Vec::new(),
            maintenance_log: Vec::new(),
            next_maintenance: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> MachineId {
        self.id
    }

    pub fn details(&self) -> &MachineDetails {
        &self.details
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    /// Accumulated use in tenths of an hour.
    pub fn usage_hours(&self) -> u64 {
        self.usage_hours
    }

    pub fn usage_log(&self) -> &[UsageEntry] {
        &self.usage_log
    }

    pub fn maintenance_log(&self) -> &[MaintenanceEntry] {
        &self.maintenance_log
    }

    pub fn next_maintenance(&self) -> Option<NaiveDate> {
        self.next_maintenance
    }

    /// Usage cost charged to a project.
    pub fn cost_for_project(&self, project_id: AggregateId) -> u64 {
        self.usage_log
            .iter()
            .filter(|u| u.project_id == Some(project_id))
            .fold(0u64, |acc, u| acc.saturating_add(u.cost))
    }
}

impl AggregateRoot for Machine {
    type Id = MachineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMachine {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub details: MachineDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMachine {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub details: MachineDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMachineStatus {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub status: MachineStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUsage {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub date: NaiveDate,
    /// Tenths of an hour.
    pub hours: u32,
    pub project_id: Option<AggregateId>,
    pub employee_id: Option<AggregateId>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMaintenance {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub date: NaiveDate,
    pub description: String,
    pub cost: u64,
    pub next_maintenance: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMachine {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineCommand {
    Create(CreateMachine),
    Update(UpdateMachine),
    ChangeStatus(ChangeMachineStatus),
    RecordUsage(RecordUsage),
    RecordMaintenance(RecordMaintenance),
    Delete(DeleteMachine),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineCreated {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub details: MachineDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineUpdated {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub details: MachineDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatusChanged {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub from: MachineStatus,
    pub to: MachineStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecorded {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub entry: UsageEntry,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRecorded {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub entry: MaintenanceEntry,
    pub next_maintenance: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDeleted {
    pub tenant_id: TenantId,
    pub machine_id: MachineId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineEvent {
    MachineCreated(MachineCreated),
    MachineUpdated(MachineUpdated),
    MachineStatusChanged(MachineStatusChanged),
    UsageRecorded(UsageRecorded),
    MaintenanceRecorded(MaintenanceRecorded),
    MachineDeleted(MachineDeleted),
}

impl Event for MachineEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MachineEvent::MachineCreated(_) => "machinery.machine.created",
            MachineEvent::MachineUpdated(_) => "machinery.machine.updated",
            MachineEvent::MachineStatusChanged(_) => "machinery.machine.status_changed",
            MachineEvent::UsageRecorded(_) => "machinery.machine.usage_recorded",
            MachineEvent::MaintenanceRecorded(_) => "machinery.machine.maintenance_recorded",
            MachineEvent::MachineDeleted(_) => "machinery.machine.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MachineEvent::MachineCreated(e) => e.occurred_at,
            MachineEvent::MachineUpdated(e) => e.occurred_at,
            MachineEvent::MachineStatusChanged(e) => e.occurred_at,
            MachineEvent::UsageRecorded(e) => e.occurred_at,
            MachineEvent::MaintenanceRecorded(e) => e.occurred_at,
            MachineEvent::MachineDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for MachineEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            MachineEvent::MachineCreated(e) => e.tenant_id,
            MachineEvent::MachineUpdated(e) => e.tenant_id,
            MachineEvent::MachineStatusChanged(e) => e.tenant_id,
            MachineEvent::UsageRecorded(e) => e.tenant_id,
            MachineEvent::MaintenanceRecorded(e) => e.tenant_id,
            MachineEvent::MachineDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Machine {
    type Command = MachineCommand;
    type Event = MachineEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MachineEvent::MachineCreated(e) => {
                self.id = e.machine_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.status = MachineStatus::Available;
                self.created = true;
            }
            MachineEvent::MachineUpdated(e) => {
                self.details = e.details.clone();
            }
            MachineEvent::MachineStatusChanged(e) => {
                self.status = e.to;
            }
            MachineEvent::UsageRecorded(e) => {
                self.usage_hours = self.usage_hours.saturating_add(u64::from(e.entry.hours));
                self.usage_log.push(e.entry.clone());
            }
            MachineEvent::MaintenanceRecorded(e) => {
                self.maintenance_log.push(e.entry.clone());
                if e.next_maintenance.is_some() {
                    self.next_maintenance = e.next_maintenance;
                }
            }
            MachineEvent::MachineDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MachineCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("machine already exists"));
                }
                Ok(vec![MachineEvent::MachineCreated(MachineCreated {
                    tenant_id: cmd.tenant_id,
                    machine_id: cmd.machine_id,
                    details: cmd.details.clone().normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            MachineCommand::Update(cmd) => self.handle_update(cmd),
            MachineCommand::ChangeStatus(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.machine_id)?;
                ensure_transition(self.status, cmd.status)?;
                Ok(vec![MachineEvent::MachineStatusChanged(MachineStatusChanged {
                    tenant_id: cmd.tenant_id,
                    machine_id: cmd.machine_id,
                    from: self.status,
                    to: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            MachineCommand::RecordUsage(cmd) => self.handle_usage(cmd),
            MachineCommand::RecordMaintenance(cmd) => self.handle_maintenance(cmd),
            MachineCommand::Delete(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.machine_id)?;
                if self.status == MachineStatus::InUse {
                    return Err(DomainError::invariant("a machine in use cannot be deleted"));
                }
                Ok(vec![MachineEvent::MachineDeleted(MachineDeleted {
                    tenant_id: cmd.tenant_id,
                    machine_id: cmd.machine_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AggregateKind for Machine {
    const AGGREGATE_TYPE: &'static str = "machinery.machine";

    fn empty(id: AggregateId) -> Self {
        Machine::empty(MachineId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl Machine {
    fn ensure_live(&self, tenant_id: TenantId, machine_id: MachineId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != machine_id {
            return Err(DomainError::invariant("machine_id mismatch"));
        }
        Ok(())
    }

    fn handle_update(&self, cmd: &UpdateMachine) -> DomainResult<Vec<MachineEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.machine_id)?;
        if self.status == MachineStatus::Retired {
            return Err(DomainError::invariant("a retired machine cannot be modified"));
        }
        let details = cmd.details.clone().normalized()?;
        if details == self.details {
            return Ok(vec![]);
        }
        Ok(vec![MachineEvent::MachineUpdated(MachineUpdated {
            tenant_id: cmd.tenant_id,
            machine_id: cmd.machine_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_usage(&self, cmd: &RecordUsage) -> DomainResult<Vec<MachineEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.machine_id)?;
        if matches!(self.status, MachineStatus::Maintenance | MachineStatus::Retired) {
            return Err(DomainError::invariant(format!(
                "usage cannot be recorded while the machine is {}",
                self.status.as_str()
            )));
        }
        if cmd.hours == 0 {
            return Err(DomainError::validation("hours must be greater than zero"));
        }
        Ok(vec![MachineEvent::UsageRecorded(UsageRecorded {
            tenant_id: cmd.tenant_id,
            machine_id: cmd.machine_id,
            entry: UsageEntry {
                date: cmd.date,
                hours: cmd.hours,
                project_id: cmd.project_id,
                employee_id: cmd.employee_id,
                cost: usage_cost(cmd.hours, self.details.hourly_cost),
                notes: optional_text(cmd.notes.as_deref()),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_maintenance(&self, cmd: &RecordMaintenance) -> DomainResult<Vec<MachineEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.machine_id)?;
        if self.status == MachineStatus::Retired {
            return Err(DomainError::invariant("a retired machine cannot be modified"));
        }
        let description = required_text("description", &cmd.description)?;
        if let Some(next) = cmd.next_maintenance {
            if next < cmd.date {
                return Err(DomainError::validation(
                    "next maintenance cannot be earlier than the maintenance date",
                ));
            }
        }
        Ok(vec![MachineEvent::MaintenanceRecorded(MaintenanceRecorded {
            tenant_id: cmd.tenant_id,
            machine_id: cmd.machine_id,
            entry: MaintenanceEntry {
                date: cmd.date,
                description,
                cost: cmd.cost,
            },
            next_maintenance: cmd.next_maintenance,
            occurred_at: cmd.occurred_at,
        })])
    }
}
