use gestiona_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to exactly one tenant.
///
/// Implemented by envelopes and by every domain event enum, so consumers can
/// check that an event's own tenant agrees with the stream it arrived on.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        EventEnvelope::tenant_id(self)
    }
}
