//! Infrastructure layer: event storage, command dispatch, read models and the
//! per-tenant runtime that ties them together.

pub mod command_dispatcher;
pub mod event_bus;
pub mod event_store;
pub mod numbering;
pub mod read_model;
pub mod tenancy;
