//! In-memory registry store.
//!
//! Suitable for tests, development and hosts that manage the tenant list
//! themselves. Clones share the same underlying map.

use super::{RegistryStore, TenantRegistry, TenantRegistryEntry, sorted_active};
use crate::error::{RegistryStoreError, RegistryStoreResult, TenancyResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry entries held in a shared map keyed by tenant id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryStore {
    entries: Arc<RwLock<HashMap<String, TenantRegistryEntry>>>,
}

impl InMemoryRegistryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryRegistryStoreBuilder {
        InMemoryRegistryStoreBuilder::new()
    }

    /// Insert or replace an entry.
    ///
    /// Replacing keeps the original creation time. The storage namespace of an
    /// existing tenant cannot change.
    pub async fn upsert(&self, entry: TenantRegistryEntry) -> RegistryStoreResult<()> {
        let mut entry = entry.validate()?;
        let mut entries = self.entries.write().await;

        if let Some(previous) = entries.get(entry.tenant_id().as_str()) {
            if previous.storage_namespace() != entry.storage_namespace() {
                return Err(RegistryStoreError::NamespaceChange {
                    tenant_id: entry.tenant_id().to_string(),
                    current: previous.storage_namespace().to_string(),
                    requested: entry.storage_namespace().to_string(),
                });
            }
            entry.carry_history_from(previous);
        }

        log::info!(
            "Registry upsert: tenant {} (active: {})",
            entry.tenant_id(),
            entry.is_active()
        );
        entries.insert(entry.tenant_id().to_string(), entry);
        Ok(())
    }

    /// Remove a tenant, returning its entry if it existed.
    pub async fn remove(&self, tenant_id: &str) -> Option<TenantRegistryEntry> {
        let removed = self.entries.write().await.remove(tenant_id);
        if removed.is_some() {
            log::info!("Registry remove: tenant {}", tenant_id);
        }
        removed
    }

    /// Activate or deactivate a registered tenant.
    pub async fn set_active(&self, tenant_id: &str, active: bool) -> RegistryStoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(tenant_id)
            .ok_or_else(|| RegistryStoreError::invalid_entry(tenant_id, "tenant is not registered"))?;
        entry.set_active(active);
        log::info!("Registry set_active: tenant {} -> {}", tenant_id, active);
        Ok(())
    }

    /// Number of registered tenants, active or not.
    pub async fn tenant_count(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl RegistryStore for InMemoryRegistryStore {
    async fn load_all(&self) -> RegistryStoreResult<Vec<TenantRegistryEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}

impl TenantRegistry for InMemoryRegistryStore {
    async fn lookup(&self, tenant_id: &str) -> TenancyResult<Option<TenantRegistryEntry>> {
        Ok(self.entries.read().await.get(tenant_id).cloned())
    }

    async fn list_active(&self) -> TenancyResult<Vec<TenantRegistryEntry>> {
        Ok(sorted_active(self.entries.read().await.values()))
    }
}

/// Builder for a pre-populated [`InMemoryRegistryStore`].
#[derive(Debug, Default)]
pub struct InMemoryRegistryStoreBuilder {
    entries: HashMap<String, TenantRegistryEntry>,
}

impl InMemoryRegistryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; a later entry for the same tenant replaces an earlier one.
    ///
    /// An empty storage namespace is replaced by the tenant's default. Other
    /// checks run when the entry is read through a validating reader.
    pub fn with_entry(mut self, entry: TenantRegistryEntry) -> Self {
        let entry = entry.with_namespace_filled();
        self.entries.insert(entry.tenant_id().to_string(), entry);
        self
    }

    pub fn build(self) -> InMemoryRegistryStore {
        InMemoryRegistryStore {
            entries: Arc::new(RwLock::new(self.entries)),
        }
    }
}
