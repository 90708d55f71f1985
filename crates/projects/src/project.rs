use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{bounded_amount, optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, CustomerRef, DomainError, DomainResult,
    Lifecycle, TenantId, ensure_transition,
};
use gestiona_events::{Event, TenantScoped};

gestiona_core::aggregate_id_newtype!(
    /// Project identifier.
    ProjectId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl Lifecycle for ProjectStatus {
    fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    fn successors(self) -> &'static [Self] {
        use ProjectStatus::*;
        match self {
            Draft => &[Active, Cancelled],
            Active => &[Paused, Completed, Cancelled],
            Paused => &[Active, Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Cents.
    #[serde(default)]
    pub budget: u64,
    #[serde(default)]
    pub address: Option<String>,
}

impl ProjectDetails {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.code = required_text("code", &self.code)?.to_uppercase();
        self.name = required_text("name", &self.name)?;
        self.budget = bounded_amount("budget", self.budget)?;
        self.customer = self.customer.map(CustomerRef::normalized).transpose()?;
        self.description = optional_text(self.description.as_deref());
        self.address = optional_text(self.address.as_deref());
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(DomainError::validation(
                    "end date cannot be earlier than the start date",
                ));
            }
        }
        Ok(self)
    }
}

/// Aggregate root: Project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    id: ProjectId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    #[serde(flatten)]
    details: ProjectDetails,
    status: ProjectStatus,
    employee_ids: BTreeSet<AggregateId>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl Project {
    pub fn empty(id: ProjectId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: ProjectDetails {
                code: String::new(),
                name: String::new(),
                customer: None,
                description: None,
                start_date: NaiveDate::MIN,
                end_date: None,
                budget: 0,
                address: None,
            },
            status: ProjectStatus::Draft,
            employee_ids: BTreeSet::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> ProjectId {
        self.id
    }

    pub fn details(&self) -> &ProjectDetails {
        &self.details
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn employee_ids(&self) -> &BTreeSet<AggregateId> {
        &self.employee_ids
    }
}

impl AggregateRoot for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub details: ProjectDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub details: ProjectDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProjectStatus {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub status: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignEmployee. `employee_terminated` is looked up by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignEmployee {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub employee_id: AggregateId,
    pub employee_terminated: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignEmployee {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub employee_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectCommand {
    Create(CreateProject),
    Update(UpdateProject),
    ChangeStatus(ChangeProjectStatus),
    AssignEmployee(AssignEmployee),
    UnassignEmployee(UnassignEmployee),
    Delete(DeleteProject),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub details: ProjectDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUpdated {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub details: ProjectDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatusChanged {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub from: ProjectStatus,
    pub to: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeAssigned {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub employee_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeUnassigned {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub employee_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDeleted {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectEvent {
    ProjectCreated(ProjectCreated),
    ProjectUpdated(ProjectUpdated),
    ProjectStatusChanged(ProjectStatusChanged),
    EmployeeAssigned(EmployeeAssigned),
    EmployeeUnassigned(EmployeeUnassigned),
    ProjectDeleted(ProjectDeleted),
}

impl Event for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::ProjectCreated(_) => "projects.project.created",
            ProjectEvent::ProjectUpdated(_) => "projects.project.updated",
            ProjectEvent::ProjectStatusChanged(_) => "projects.project.status_changed",
            ProjectEvent::EmployeeAssigned(_) => "projects.project.employee_assigned",
            ProjectEvent::EmployeeUnassigned(_) => "projects.project.employee_unassigned",
            ProjectEvent::ProjectDeleted(_) => "projects.project.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProjectEvent::ProjectCreated(e) => e.occurred_at,
            ProjectEvent::ProjectUpdated(e) => e.occurred_at,
            ProjectEvent::ProjectStatusChanged(e) => e.occurred_at,
            ProjectEvent::EmployeeAssigned(e) => e.occurred_at,
            ProjectEvent::EmployeeUnassigned(e) => e.occurred_at,
            ProjectEvent::ProjectDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for ProjectEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            ProjectEvent::ProjectCreated(e) => e.tenant_id,
            ProjectEvent::ProjectUpdated(e) => e.tenant_id,
            ProjectEvent::ProjectStatusChanged(e) => e.tenant_id,
            ProjectEvent::EmployeeAssigned(e) => e.tenant_id,
            ProjectEvent::EmployeeUnassigned(e) => e.tenant_id,
            ProjectEvent::ProjectDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Project {
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProjectEvent::ProjectCreated(e) => {
                self.id = e.project_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.status = ProjectStatus::Draft;
                self.created = true;
            }
            ProjectEvent::ProjectUpdated(e) => {
                self.details = e.details.clone();
            }
            ProjectEvent::ProjectStatusChanged(e) => {
                self.status = e.to;
            }
            ProjectEvent::EmployeeAssigned(e) => {
                self.employee_ids.insert(e.employee_id);
            }
            ProjectEvent::EmployeeUnassigned(e) => {
                self.employee_ids.remove(&e.employee_id);
            }
            ProjectEvent::ProjectDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProjectCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("project already exists"));
                }
                Ok(vec![ProjectEvent::ProjectCreated(ProjectCreated {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    details: cmd.details.clone().normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::Update(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.project_id)?;
                if self.status.is_terminal() {
                    return Err(DomainError::invariant(format!(
                        "a {} project cannot be modified",
                        self.status.as_str()
                    )));
                }
                let details = cmd.details.clone().normalized()?;
                if details == self.details {
                    return Ok(vec![]);
                }
                Ok(vec![ProjectEvent::ProjectUpdated(ProjectUpdated {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    details,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::ChangeStatus(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.project_id)?;
                ensure_transition(self.status, cmd.status)?;
                Ok(vec![ProjectEvent::ProjectStatusChanged(ProjectStatusChanged {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    from: self.status,
                    to: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::AssignEmployee(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.project_id)?;
                if self.status.is_terminal() {
                    return Err(DomainError::invariant(format!(
                        "employees cannot be assigned to a {} project",
                        self.status.as_str()
                    )));
                }
                if cmd.employee_terminated {
                    return Err(DomainError::invariant(
                        "terminated employees cannot be assigned",
                    ));
                }
                if self.employee_ids.contains(&cmd.employee_id) {
                    return Ok(vec![]);
                }
                Ok(vec![ProjectEvent::EmployeeAssigned(EmployeeAssigned {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    employee_id: cmd.employee_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::UnassignEmployee(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.project_id)?;
                if !self.employee_ids.contains(&cmd.employee_id) {
                    return Err(DomainError::not_found());
                }
                Ok(vec![ProjectEvent::EmployeeUnassigned(EmployeeUnassigned {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    employee_id: cmd.employee_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::Delete(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.project_id)?;
                if self.status != ProjectStatus::Draft {
                    return Err(DomainError::invariant("only draft projects can be deleted"));
                }
                Ok(vec![ProjectEvent::ProjectDeleted(ProjectDeleted {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AggregateKind for Project {
    const AGGREGATE_TYPE: &'static str = "projects.project";

    fn empty(id: AggregateId) -> Self {
        Project::empty(ProjectId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl Project {
    fn ensure_live(&self, tenant_id: TenantId, project_id: ProjectId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != project_id {
            return Err(DomainError::invariant("project_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(project: &mut Project, cmd: ProjectCommand) -> DomainResult<()> {
        for e in project.handle(&cmd)? {
            project.apply(&e);
        }
        Ok(())
    }

    fn details() -> ProjectDetails {
        ProjectDetails {
            code: "obr-2026-01".into(),
            name: "Reforma nave".into(),
            customer: None,
            description: None,
            start_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            end_date: None,
            budget: 50_000_00,
            address: None,
        }
    }

    fn opened(t: TenantId) -> Project {
        let id = ProjectId::generate();
        let mut project = Project::empty(id);
        run(
            &mut project,
            ProjectCommand::Create(CreateProject {
                tenant_id: t,
                project_id: id,
                details: details(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        project
    }

    fn status(t: TenantId, id: ProjectId, to: ProjectStatus) -> ProjectCommand {
        ProjectCommand::ChangeStatus(ChangeProjectStatus {
            tenant_id: t,
            project_id: id,
            status: to,
            occurred_at: Utc::now(),
        })
    }

    fn assign(t: TenantId, id: ProjectId, employee: AggregateId, terminated: bool) -> ProjectCommand {
        ProjectCommand::AssignEmployee(AssignEmployee {
            tenant_id: t,
            project_id: id,
            employee_id: employee,
            employee_terminated: terminated,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn end_date_must_follow_start() {
        let mut d = details();
        d.end_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert!(d.normalized().is_err());
    }

    #[test]
    fn lifecycle() {
        let t = TenantId::new();
        let mut project = opened(t);
        let id = project.id_typed();
        assert_eq!(project.details().code, "OBR-2026-01");

        run(&mut project, status(t, id, ProjectStatus::Active)).unwrap();
        run(&mut project, status(t, id, ProjectStatus::Paused)).unwrap();
        run(&mut project, status(t, id, ProjectStatus::Active)).unwrap();
        run(&mut project, status(t, id, ProjectStatus::Completed)).unwrap();

        let err = run(&mut project, status(t, id, ProjectStatus::Active)).unwrap_err();
        assert_eq!(
            err,
            DomainError::invariant("cannot move from 'completed' to 'active'")
        );
    }

    #[test]
    fn staffing_rules() {
        let t = TenantId::new();
        let mut project = opened(t);
        let id = project.id_typed();
        let worker = AggregateId::new();

        let err = run(&mut project, assign(t, id, AggregateId::new(), true)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        run(&mut project, assign(t, id, worker, false)).unwrap();
        run(&mut project, assign(t, id, worker, false)).unwrap();
        assert_eq!(project.employee_ids().len(), 1);

        run(
            &mut project,
            ProjectCommand::UnassignEmployee(UnassignEmployee {
                tenant_id: t,
                project_id: id,
                employee_id: worker,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(project.employee_ids().is_empty());

        run(&mut project, status(t, id, ProjectStatus::Cancelled)).unwrap();
        let err = run(&mut project, assign(t, id, worker, false)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn only_drafts_are_deleted() {
        let t = TenantId::new();
        let mut project = opened(t);
        let id = project.id_typed();
        run(&mut project, status(t, id, ProjectStatus::Active)).unwrap();
        let err = run(
            &mut project,
            ProjectCommand::Delete(DeleteProject {
                tenant_id: t,
                project_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
