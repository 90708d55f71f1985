//! Projects (obras): lifecycle, staffing and cost tracking.

pub mod cost;
pub mod project;

pub use cost::CostReport;
pub use project::{
    AssignEmployee, ChangeProjectStatus, CreateProject, DeleteProject, EmployeeAssigned,
    EmployeeUnassigned, Project, ProjectCommand, ProjectCreated, ProjectDeleted, ProjectDetails,
    ProjectEvent, ProjectId, ProjectStatus, ProjectStatusChanged, ProjectUpdated,
    UnassignEmployee, UpdateProject,
};
