use std::collections::HashMap;

use thiserror::Error;

use gestiona_core::TenantId;

use crate::event_store::EventStoreError;

use super::config::{TenancyConfig, TenantConfig};

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("tenant {0} not found")]
    NotFound(TenantId),

    #[error("tenant {0} is inactive")]
    Inactive(TenantId),

    #[error("tenant {tenant_id} is misconfigured: {message}")]
    Misconfigured { tenant_id: TenantId, message: String },

    #[error("tenant store unavailable: {0}")]
    Store(#[from] EventStoreError),
}

/// Lookup of configured tenants.
#[derive(Debug, Clone)]
pub struct TenantDirectory {
    tenants: HashMap<TenantId, TenantConfig>,
    auto_provision: bool,
}

impl TenantDirectory {
    pub fn new(config: &TenancyConfig) -> Self {
        Self {
            tenants: config.tenants.iter().map(|t| (t.id, t.clone())).collect(),
            auto_provision: config.auto_provision,
        }
    }

    pub fn resolve(&self, tenant_id: TenantId) -> Result<TenantConfig, TenancyError> {
        match self.tenants.get(&tenant_id) {
            Some(t) if !t.active => Err(TenancyError::Inactive(tenant_id)),
            Some(t) => Ok(t.clone()),
            None if self.auto_provision => Ok(TenantConfig::provisional(tenant_id)),
            None => Err(TenancyError::NotFound(tenant_id)),
        }
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auto_provision: bool, tenants: Vec<TenantConfig>) -> TenancyConfig {
        TenancyConfig { auto_provision, tenants }
    }

    #[test]
    fn configured_tenant_resolves() {
        let t = TenantConfig::provisional(TenantId::new());
        let dir = TenantDirectory::new(&config(false, vec![t.clone()]));
        assert_eq!(dir.resolve(t.id).unwrap(), t);
    }

    #[test]
    fn inactive_tenant_is_refused_even_with_auto_provision() {
        let mut t = TenantConfig::provisional(TenantId::new());
        t.active = false;
        let dir = TenantDirectory::new(&config(true, vec![t.clone()]));
        assert!(matches!(dir.resolve(t.id), Err(TenancyError::Inactive(id)) if id == t.id));
    }

    #[test]
    fn unknown_tenant_depends_on_auto_provision() {
        let id = TenantId::new();
        let strict = TenantDirectory::new(&config(false, vec![]));
        assert!(matches!(strict.resolve(id), Err(TenancyError::NotFound(_))));

        let open = TenantDirectory::new(&config(true, vec![]));
        assert!(open.resolve(id).unwrap().name.starts_with("Empresa "));
    }
}
