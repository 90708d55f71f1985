//! Restaurant floor management: salons (rooms) and their tables.
//!
//! Pure domain logic. Cross-aggregate rules (table number uniqueness, salon
//! deletion guard, grouping several tables) are orchestrated by the caller,
//! which feeds the facts it looked up into the commands.

pub mod layout;
pub mod salon;
pub mod table;

pub use layout::{Capacity, Dimensions, MAX_TABLE_SEATS, FloorPlan, OpeningHours, Position, SalonFeatures, TableShape};
pub use salon::{
    CreateSalon, DeleteSalon, Salon, SalonCommand, SalonCreated, SalonDeleted, SalonDetails,
    SalonEvent, SalonId, SalonUpdated, SetSalonActive, SalonActivationChanged, UpdateSalon,
};
pub use table::{
    ChangeTableStatus, CreateTable, DeleteTable, JoinTableGroup, LeaveTableGroup, MoveTable,
    Occupancy, OccupancyInput, ReleasedOccupancy, Table, TableCommand, TableCreated, TableDeleted,
    TableDetails, TableEvent, TableGroup, TableGrouped, TableId, TableMoved, TableStats,
    TableStatus, TableStatusChanged, TableUngrouped, TableUpdated, UpdateTable,
};
