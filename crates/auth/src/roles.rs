use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC. Opaque at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role policy. Unknown roles grant nothing.
fn role_grants(role: &str) -> &'static [&'static str] {
    match role {
        "admin" | "manager" => &["*"],
        "waiter" => &["restaurant.tables.*"],
        "warehouse" => &["inventory.*"],
        "accountant" => &["treasury.*", "invoicing.*"],
        "hr" => &["personnel.*"],
        "site_manager" => &["projects.*", "machinery.*"],
        _ => &[],
    }
}

/// Effective permissions of a set of roles, deduplicated.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for role in roles {
        for grant in role_grants(role.as_str()) {
            let perm = Permission::new(*grant);
            if !out.contains(&perm) {
                out.push(perm);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiter_can_only_touch_tables() {
        let perms = permissions_for_roles(&[Role::new("waiter")]);
        assert_eq!(perms, vec![Permission::new("restaurant.tables.*")]);
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(permissions_for_roles(&[Role::new("guest")]).is_empty());
    }
}
