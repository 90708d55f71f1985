use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use gestiona_core::TenantId;

use crate::event_bus::RealtimeBus;

use super::directory::{TenancyError, TenantDirectory};
use super::runtime::TenantRuntime;

type RuntimeCell = Arc<OnceCell<Arc<TenantRuntime>>>;

/// Per-tenant runtime factory with a cache.
///
/// Each tenant has its own once-cell: concurrent first requests of a tenant
/// share a single runtime, and the map lock is only held to find the cell,
/// never while a runtime replays its history.
#[derive(Debug)]
pub struct TenantRegistry {
    directory: TenantDirectory,
    bus: Arc<RealtimeBus>,
    runtimes: Mutex<HashMap<TenantId, RuntimeCell>>,
}

impl TenantRegistry {
    pub fn new(directory: TenantDirectory, bus: Arc<RealtimeBus>) -> Self {
        Self {
            directory,
            bus,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &Arc<RealtimeBus> {
        &self.bus
    }

    pub async fn runtime(&self, tenant_id: TenantId) -> Result<Arc<TenantRuntime>, TenancyError> {
        // Resolve first so a tenant deactivated in config stops being served.
        let config = self.directory.resolve(tenant_id)?;

        let cell = self.cell(tenant_id).await;
        let rt = cell
            .get_or_try_init(|| async {
                tracing::info!(tenant_id = %tenant_id, kind = ?config.database.kind, "building tenant runtime");
                TenantRuntime::open(config, self.bus.clone()).await.map(Arc::new)
            })
            .await?;
        Ok(rt.clone())
    }

    async fn cell(&self, tenant_id: TenantId) -> RuntimeCell {
        self.runtimes.lock().await.entry(tenant_id).or_default().clone()
    }

    /// Runtimes built so far. Failed builds are not counted.
    pub async fn cached(&self) -> usize {
        self.runtimes
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{TenancyConfig, TenantConfig};

    fn registry(auto_provision: bool, tenants: Vec<TenantConfig>) -> Arc<TenantRegistry> {
        let directory = TenantDirectory::new(&TenancyConfig { auto_provision, tenants });
        Arc::new(TenantRegistry::new(directory, Arc::new(RealtimeBus::default())))
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_runtime() {
        let reg = registry(true, vec![]);
        let tenant = TenantId::new();

        let (a, b) = tokio::join!(reg.runtime(tenant), reg.runtime(tenant));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(reg.cached().await, 1);
    }

    #[tokio::test]
    async fn cold_start_of_one_tenant_does_not_block_another() {
        let reg = registry(true, vec![]);
        let (slow, fast) = (TenantId::new(), TenantId::new());

        // Park the slow tenant in the middle of building its runtime.
        let cell = reg.cell(slow).await;
        let parked = tokio::spawn(async move {
            cell.get_or_init(|| std::future::pending::<Arc<TenantRuntime>>()).await;
        });
        tokio::task::yield_now().await;

        let rt = tokio::time::timeout(std::time::Duration::from_secs(5), reg.runtime(fast))
            .await
            .expect("registry lookup waited on another tenant")
            .unwrap();
        assert!(Arc::ptr_eq(&rt, &reg.runtime(fast).await.unwrap()));
        assert_eq!(reg.cached().await, 1);
        parked.abort();
    }

    #[tokio::test]
    async fn unknown_tenant_without_auto_provision_fails() {
        let reg = registry(false, vec![]);
        assert!(matches!(reg.runtime(TenantId::new()).await, Err(TenancyError::NotFound(_))));
        assert_eq!(reg.cached().await, 0);
    }

    #[tokio::test]
    async fn configured_tenant_keeps_its_profile() {
        let mut config = TenantConfig::provisional(TenantId::new());
        config.company.legal_name = "Construcciones Norte S.L.".to_string();
        let reg = registry(false, vec![config.clone()]);

        let rt = reg.runtime(config.id).await.unwrap();
        assert_eq!(rt.company().legal_name, "Construcciones Norte S.L.");
    }
}
