//! Process-wide realtime feed of committed events.

use std::convert::Infallible;

use gestiona_events::{EventBus, EventEnvelope};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

pub type JsonEnvelope = EventEnvelope<JsonValue>;

/// Bus shared by every tenant runtime.
///
/// Backed by a lossy broadcast channel that feeds server-sent events. A slow
/// SSE client lags and drops messages; it never blocks a command.
#[derive(Debug)]
pub struct RealtimeBus {
    live: broadcast::Sender<JsonEnvelope>,
}

impl RealtimeBus {
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity.max(1));
        Self { live }
    }

    /// Async receiver for SSE handlers. Filter by tenant on the consumer side.
    pub fn live(&self) -> broadcast::Receiver<JsonEnvelope> {
        self.live.subscribe()
    }
}

impl Default for RealtimeBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus<JsonEnvelope> for RealtimeBus {
    type Error = Infallible;

    fn publish(&self, message: JsonEnvelope) -> Result<(), Self::Error> {
        // No receivers is not an error for a lossy feed.
        let _ = self.live.send(message);
        Ok(())
    }
}
