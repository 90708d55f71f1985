use thiserror::Error;

use gestiona_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract, checked before dispatch.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active tenant context. Pure policy check.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal
        .membership
        .permissions
        .iter()
        .any(|granted| granted.grants(required))
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, permissions_for_roles};

    fn principal(tenant_id: TenantId, roles: Vec<Role>) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            active_tenant_id: tenant_id,
            membership: TenantMembership {
                tenant_id,
                permissions: permissions_for_roles(&roles),
                roles,
            },
        }
    }

    #[test]
    fn accountant_may_collect_but_not_seat_guests() {
        let p = principal(TenantId::new(), vec![Role::new("accountant")]);
        assert!(authorize(&p, &Permission::new("treasury.receipts.collect")).is_ok());
        assert_eq!(
            authorize(&p, &Permission::new("restaurant.tables.status")),
            Err(AuthzError::Forbidden("restaurant.tables.status".to_string()))
        );
    }

    #[test]
    fn membership_in_another_tenant_is_rejected() {
        let mut p = principal(TenantId::new(), vec![Role::new("admin")]);
        p.active_tenant_id = TenantId::new();
        assert_eq!(
            authorize(&p, &Permission::new("projects.projects.create")),
            Err(AuthzError::TenantMismatch)
        );
    }
}
