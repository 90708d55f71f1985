use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use gestiona_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn remove(&self, tenant_id: TenantId, key: &K);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Drop every record of a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn remove(&self, tenant_id: TenantId, key: &K) {
        (**self).remove(tenant_id, key)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, key), value);
        }
    }

    fn remove(&self, tenant_id: TenantId, key: &K) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&(tenant_id, key.clone()));
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };
        map.iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_isolated_per_tenant() {
        let store = InMemoryTenantStore::<u32, &str>::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, 1, "a1");
        store.upsert(b, 1, "b1");

        assert_eq!(store.get(a, &1), Some("a1"));
        assert_eq!(store.list(b), vec!["b1"]);

        store.remove(a, &1);
        assert_eq!(store.get(a, &1), None);
        assert_eq!(store.get(b, &1), Some("b1"));

        store.clear_tenant(b);
        assert!(store.list(b).is_empty());
    }
}
