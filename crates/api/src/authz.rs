//! API-side authorization guard for commands.
//!
//! Enforced at the command boundary (before dispatch). Domain aggregates and
//! infra stay auth-agnostic.

use gestiona_auth::{
    AuthzError, CommandAuthorization, Permission, Principal, TenantMembership, authorize,
    permissions_for_roles,
};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = resolve(tenant, principal);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Check a single permission, for workflows that dispatch several commands.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &'static str,
) -> Result<(), AuthzError> {
    authorize(&resolve(tenant, principal), &Permission::new(permission))
}

fn resolve(tenant: &TenantContext, principal: &PrincipalContext) -> Principal {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_for_roles(principal.roles()),
    };

    Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::routes::common::CmdAuth;
    use gestiona_auth::{PrincipalId, Role};
    use gestiona_core::TenantId;

    fn ctx(roles: &[&'static str]) -> (TenantContext, PrincipalContext) {
        (
            TenantContext::new(TenantId::new()),
            PrincipalContext::new(PrincipalId::new(), roles.iter().map(|r| Role::new(*r)).collect()),
        )
    }

    #[test]
    fn waiter_may_change_table_status_only() {
        let (tenant, principal) = ctx(&["waiter"]);
        assert!(require(&tenant, &principal, "restaurant.tables.status").is_ok());
        assert!(require(&tenant, &principal, "restaurant.salons.delete").is_err());
    }

    #[test]
    fn every_required_permission_is_checked() {
        let (tenant, principal) = ctx(&["warehouse"]);
        let cmd = CmdAuth {
            inner: (),
            required: vec![
                Permission::new("inventory.transfers.ship"),
                Permission::new("invoicing.delivery_notes.create"),
            ],
        };
        assert_eq!(
            authorize_command(&tenant, &principal, &cmd),
            Err(AuthzError::Forbidden("invoicing.delivery_notes.create".to_string()))
        );
    }
}
