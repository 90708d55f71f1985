use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{bounded_amount, optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, Lifecycle,
    TenantId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

use crate::tax_id::normalize_tax_id;

gestiona_core::aggregate_id_newtype!(
    /// Employee identifier.
    EmployeeId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    OnLeave,
    Terminated,
}

impl Lifecycle for EmployeeStatus {
    fn as_str(self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::OnLeave => "on_leave",
            EmployeeStatus::Terminated => "terminated",
        }
    }

    fn successors(self) -> &'static [Self] {
        use EmployeeStatus::*;
        match self {
            Active => &[OnLeave, Terminated],
            OnLeave => &[Active, Terminated],
            Terminated => &[Active],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDetails {
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    /// DNI or NIE.
    pub tax_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub hire_date: NaiveDate,
    /// Cents per hour.
    #[serde(default)]
    pub hourly_cost: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl EmployeeDetails {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.code = required_text("code", &self.code)?.to_uppercase();
        self.first_name = required_text("first_name", &self.first_name)?;
        self.last_name = required_text("last_name", &self.last_name)?;
        self.hourly_cost = bounded_amount("hourly_cost", self.hourly_cost)?;
        self.tax_id = normalize_tax_id(&self.tax_id)?;
        self.email = optional_text(self.email.as_deref()).map(|e| e.to_lowercase());
        if let Some(email) = &self.email {
            if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
                return Err(DomainError::validation(format!("'{email}' is not an email")));
            }
        }
        self.phone = optional_text(self.phone.as_deref());
        self.position = optional_text(self.position.as_deref());
        self.department = optional_text(self.department.as_deref());
        self.notes = optional_text(self.notes.as_deref());
        Ok(self)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Aggregate root: Employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Employee {
    id: EmployeeId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    #[serde(flatten)]
    details: EmployeeDetails,
    status: EmployeeStatus,
    termination_date: Option<NaiveDate>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl Employee {
    pub fn empty(id: EmployeeId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: EmployeeDetails {
                code: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                tax_id: String::new(),
                email: None,
                phone: None,
                position: None,
                department: None,
                hire_date: NaiveDate::MIN,
                hourly_cost: 0,
                notes: None,
            },
            status: EmployeeStatus::Active,
            termination_date: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> EmployeeId {
        self.id
    }

    pub fn details(&self) -> &EmployeeDetails {
        &self.details
    }

    pub fn status(&self) -> EmployeeStatus {
        self.status
    }

    pub fn termination_date(&self) -> Option<NaiveDate> {
        self.termination_date
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub details: EmployeeDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub details: EmployeeDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLeave {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndLeave {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub termination_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RehireEmployee. `hire_date` replaces the previous one when given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehireEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub hire_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeCommand {
    Create(CreateEmployee),
    Update(UpdateEmployee),
    StartLeave(StartLeave),
    EndLeave(EndLeave),
    Terminate(TerminateEmployee),
    Rehire(RehireEmployee),
    Delete(DeleteEmployee),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeCreated {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub details: EmployeeDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeUpdated {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub details: EmployeeDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeStatusChanged {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub from: EmployeeStatus,
    pub to: EmployeeStatus,
    pub termination_date: Option<NaiveDate>,
    pub hire_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDeleted {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeEvent {
    EmployeeCreated(EmployeeCreated),
    EmployeeUpdated(EmployeeUpdated),
    EmployeeStatusChanged(EmployeeStatusChanged),
    EmployeeDeleted(EmployeeDeleted),
}

impl Event for EmployeeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::EmployeeCreated(_) => "personnel.employee.created",
            EmployeeEvent::EmployeeUpdated(_) => "personnel.employee.updated",
            EmployeeEvent::EmployeeStatusChanged(_) => "personnel.employee.status_changed",
            EmployeeEvent::EmployeeDeleted(_) => "personnel.employee.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EmployeeEvent::EmployeeCreated(e) => e.occurred_at,
            EmployeeEvent::EmployeeUpdated(e) => e.occurred_at,
            EmployeeEvent::EmployeeStatusChanged(e) => e.occurred_at,
            EmployeeEvent::EmployeeDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for EmployeeEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            EmployeeEvent::EmployeeCreated(e) => e.tenant_id,
            EmployeeEvent::EmployeeUpdated(e) => e.tenant_id,
            EmployeeEvent::EmployeeStatusChanged(e) => e.tenant_id,
            EmployeeEvent::EmployeeDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Employee {
    type Command = EmployeeCommand;
    type Event = EmployeeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EmployeeEvent::EmployeeCreated(e) => {
                self.id = e.employee_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.status = EmployeeStatus::Active;
                self.created = true;
            }
            EmployeeEvent::EmployeeUpdated(e) => {
                self.details = e.details.clone();
            }
            EmployeeEvent::EmployeeStatusChanged(e) => {
                self.status = e.to;
                self.termination_date = e.termination_date;
                if let Some(hire_date) = e.hire_date {
                    self.details.hire_date = hire_date;
                }
            }
            EmployeeEvent::EmployeeDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EmployeeCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("employee already exists"));
                }
                Ok(vec![EmployeeEvent::EmployeeCreated(EmployeeCreated {
                    tenant_id: cmd.tenant_id,
                    employee_id: cmd.employee_id,
                    details: cmd.details.clone().normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            EmployeeCommand::Update(cmd) => self.handle_update(cmd),
            EmployeeCommand::StartLeave(cmd) => self.change_status(
                cmd.tenant_id,
                cmd.employee_id,
                EmployeeStatus::OnLeave,
                None,
                None,
                cmd.occurred_at,
            ),
            EmployeeCommand::EndLeave(cmd) => {
                if self.status != EmployeeStatus::OnLeave {
                    return Err(DomainError::invariant("employee is not on leave"));
                }
                self.change_status(
                    cmd.tenant_id,
                    cmd.employee_id,
                    EmployeeStatus::Active,
                    None,
                    None,
                    cmd.occurred_at,
                )
            }
            EmployeeCommand::Terminate(cmd) => {
                if cmd.termination_date < self.details.hire_date {
                    return Err(DomainError::validation(
                        "termination date cannot be earlier than the hire date",
                    ));
                }
                self.change_status(
                    cmd.tenant_id,
                    cmd.employee_id,
                    EmployeeStatus::Terminated,
                    Some(cmd.termination_date),
                    None,
                    cmd.occurred_at,
                )
            }
            EmployeeCommand::Rehire(cmd) => {
                if self.status != EmployeeStatus::Terminated {
                    return Err(DomainError::invariant("only terminated employees can be rehired"));
                }
                if let (Some(hire), Some(left)) = (cmd.hire_date, self.termination_date) {
                    if hire < left {
                        return Err(DomainError::validation(
                            "rehire date cannot be earlier than the termination date",
                        ));
                    }
                }
                self.change_status(
                    cmd.tenant_id,
                    cmd.employee_id,
                    EmployeeStatus::Active,
                    None,
                    cmd.hire_date,
                    cmd.occurred_at,
                )
            }
            EmployeeCommand::Delete(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.employee_id)?;
                Ok(vec![EmployeeEvent::EmployeeDeleted(EmployeeDeleted {
                    tenant_id: cmd.tenant_id,
                    employee_id: cmd.employee_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AggregateKind for Employee {
    const AGGREGATE_TYPE: &'static str = "personnel.employee";

    fn empty(id: AggregateId) -> Self {
        Employee::empty(EmployeeId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl Employee {
    fn ensure_live(&self, tenant_id: TenantId, employee_id: EmployeeId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != employee_id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        Ok(())
    }

    fn handle_update(&self, cmd: &UpdateEmployee) -> DomainResult<Vec<EmployeeEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.employee_id)?;
        let details = cmd.details.clone().normalized()?;
        if let Some(left) = self.termination_date {
            if details.hire_date > left {
                return Err(DomainError::validation(
                    "hire date cannot be later than the termination date",
                ));
            }
        }
        if details == self.details {
            return Ok(vec![]);
        }
        Ok(vec![EmployeeEvent::EmployeeUpdated(EmployeeUpdated {
            tenant_id: cmd.tenant_id,
            employee_id: cmd.employee_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn change_status(
        &self,
        tenant_id: TenantId,
        employee_id: EmployeeId,
        to: EmployeeStatus,
        termination_date: Option<NaiveDate>,
        hire_date: Option<NaiveDate>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<EmployeeEvent>> {
        self.ensure_live(tenant_id, employee_id)?;
        ensure_transition(self.status, to)?;
        Ok(vec![EmployeeEvent::EmployeeStatusChanged(EmployeeStatusChanged {
            tenant_id,
            employee_id,
            from: self.status,
            to,
            termination_date,
            hire_date,
            occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(employee: &mut Employee, cmd: EmployeeCommand) -> DomainResult<()> {
        for e in employee.handle(&cmd)? {
            employee.apply(&e);
        }
        Ok(())
    }

    fn hired(tenant_id: TenantId) -> Employee {
        let id = EmployeeId::generate();
        let mut employee = Employee::empty(id);
        run(
            &mut employee,
            EmployeeCommand::Create(CreateEmployee {
                tenant_id,
                employee_id: id,
                details: EmployeeDetails {
                    code: "emp-001".into(),
                    first_name: "Lucía".into(),
                    last_name: "Martín".into(),
                    tax_id: "12345678z".into(),
                    email: Some("Lucia@Example.com".into()),
                    phone: None,
                    position: Some("Oficial 1ª".into()),
                    department: None,
                    hire_date: date(2024, 2, 1),
                    hourly_cost: 18_50,
                    notes: None,
                },
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        employee
    }

    #[test]
    fn create_normalises_fields() {
        let employee = hired(TenantId::new());
        assert_eq!(employee.details().code, "EMP-001");
        assert_eq!(employee.details().tax_id, "12345678Z");
        assert_eq!(employee.details().email.as_deref(), Some("lucia@example.com"));
        assert_eq!(employee.status(), EmployeeStatus::Active);
    }

    #[test]
    fn termination_date_follows_hire_date() {
        let t = TenantId::new();
        let mut employee = hired(t);
        let id = employee.id_typed();
        let err = run(
            &mut employee,
            EmployeeCommand::Terminate(TerminateEmployee {
                tenant_id: t,
                employee_id: id,
                termination_date: date(2024, 1, 1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn leave_terminate_and_rehire() {
        let t = TenantId::new();
        let mut employee = hired(t);
        let id = employee.id_typed();

        run(
            &mut employee,
            EmployeeCommand::StartLeave(StartLeave {
                tenant_id: t,
                employee_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(employee.status(), EmployeeStatus::OnLeave);

        run(
            &mut employee,
            EmployeeCommand::Terminate(TerminateEmployee {
                tenant_id: t,
                employee_id: id,
                termination_date: date(2025, 6, 30),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(employee.termination_date(), Some(date(2025, 6, 30)));

        let err = run(
            &mut employee,
            EmployeeCommand::StartLeave(StartLeave {
                tenant_id: t,
                employee_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DomainError::invariant("cannot move from 'terminated' to 'on_leave'")
        );

        run(
            &mut employee,
            EmployeeCommand::Rehire(RehireEmployee {
                tenant_id: t,
                employee_id: id,
                hire_date: Some(date(2026, 1, 12)),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(employee.status(), EmployeeStatus::Active);
        assert_eq!(employee.termination_date(), None);
        assert_eq!(employee.details().hire_date, date(2026, 1, 12));
    }

    #[test]
    fn invalid_dni_is_rejected() {
        let t = TenantId::new();
        let mut employee = hired(t);
        let id = employee.id_typed();
        let mut details = employee.details().clone();
        details.tax_id = "12345678A".into();
        let err = run(
            &mut employee,
            EmployeeCommand::Update(UpdateEmployee {
                tenant_id: t,
                employee_id: id,
                details,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("control letter")));
    }
}
