//! Personnel (personal): employees, their employment status and cost.

pub mod employee;
pub mod tax_id;

pub use employee::{
    CreateEmployee, DeleteEmployee, Employee, EmployeeCommand, EmployeeCreated, EmployeeDeleted,
    EmployeeDetails, EmployeeEvent, EmployeeId, EmployeeStatus, EmployeeStatusChanged,
    EmployeeUpdated, EndLeave, RehireEmployee, StartLeave, TerminateEmployee, UpdateEmployee,
};
pub use tax_id::normalize_tax_id;
