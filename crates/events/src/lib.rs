//! Domain events, envelopes and the bus they are published on.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod tenant;

pub use bus::EventBus;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use tenant::TenantScoped;
