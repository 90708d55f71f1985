//! Machinery fleet: vehicles, tools and equipment with usage and maintenance logs.

pub mod machine;

pub use machine::{
    ChangeMachineStatus, CreateMachine, DeleteMachine, Machine, MachineCommand, MachineCreated,
    MachineDeleted, MachineDetails, MachineEvent, MachineId, MachineKind, MachineStatus,
    MachineStatusChanged, MachineUpdated, MaintenanceEntry, MaintenanceRecorded,
    RecordMaintenance, RecordUsage, UpdateMachine, UsageEntry, UsageRecorded, usage_cost,
};
