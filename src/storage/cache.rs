//! Tenant-namespaced cache.
//!
//! Callers pass base keys; the cache prefixes them with the scope's tenant so
//! two tenants asking for `"dashboard:1"` never see each other's entry. A whole
//! tenant can be evicted at once, for example after deactivation.

use crate::context::{TenantContext, TenantId};
use crate::namespace::{cache_key, owns_cache_key};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// Shared cache whose keys are always tenant-prefixed.
#[derive(Debug, Clone, Default)]
pub struct TenantCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl TenantCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value cached under `base_key` for the context's tenant.
    pub async fn get(&self, context: &TenantContext, base_key: &str) -> Option<Value> {
        let key = cache_key(base_key, context.tenant());
        let entries = self.entries.read().await;
        entries
            .get(&key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Cache `value` for the context's tenant, optionally expiring after `ttl`.
    pub async fn set(&self, context: &TenantContext, base_key: &str, value: Value, ttl: Option<Duration>) {
        let key = cache_key(base_key, context.tenant());
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Remove one entry, reporting whether a live one existed.
    pub async fn delete(&self, context: &TenantContext, base_key: &str) -> bool {
        let key = cache_key(base_key, context.tenant());
        self.entries
            .write()
            .await
            .remove(&key)
            .is_some_and(|entry| entry.is_live(Instant::now()))
    }

    /// Evict every entry belonging to `tenant_id`, returning how many were removed.
    pub async fn clear_tenant(&self, tenant_id: &TenantId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !owns_cache_key(key, tenant_id));
        let removed = before - entries.len();
        log::info!("Cleared {} cache entries for tenant {}", removed, tenant_id);
        removed
    }

    /// Drop expired entries for all tenants.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
