use std::sync::Arc;

use gestiona_auth::{PrincipalId, Role};
use gestiona_core::{TenantId, UserId};
use gestiona_infra::tenancy::TenantRuntime;

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn user_id(&self) -> UserId {
        self.principal_id.as_user()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

/// Runtime of the request's tenant, resolved after authentication.
#[derive(Debug, Clone)]
pub struct TenantHandle(pub Arc<TenantRuntime>);

impl std::ops::Deref for TenantHandle {
    type Target = TenantRuntime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
