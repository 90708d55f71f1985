//! Process-wide tracing/logging setup.

pub mod tracing;

pub use self::tracing::{LogFormat, TelemetryConfig};

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: &TelemetryConfig) {
    self::tracing::init(config);
}
