//! In-memory resource store.
//!
//! Rows are grouped by kind and kept in id order, then owner order, so that
//! listings are stable. Clones share the same data.

use super::{ResourceStore, StorageResult, StoreKey, StoredResource};
use crate::enforcer::ResourceKind;
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

// (id, owner); legacy rows sort before owned ones
type RowKey = (String, Option<String>);

#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceStore {
    // kind -> (id, owner) -> row
    data: Arc<RwLock<HashMap<ResourceKind, BTreeMap<RowKey, StoredResource>>>>,
}

/// Row counts for an [`InMemoryResourceStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryResourceStoreStats {
    pub kind_count: usize,
    pub total_resources: usize,
    pub legacy_resources: usize,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> InMemoryResourceStoreStats {
        let data = self.data.read().await;
        let mut stats = InMemoryResourceStoreStats {
            kind_count: 0,
            total_resources: 0,
            legacy_resources: 0,
        };
        for rows in data.values().filter(|rows| !rows.is_empty()) {
            stats.kind_count += 1;
            stats.total_resources += rows.len();
            stats.legacy_resources += rows.values().filter(|r| r.tenant_id().is_none()).count();
        }
        stats
    }

    /// Distinct owners present in the store; legacy rows are not counted.
    pub async fn list_tenants(&self) -> Vec<String> {
        let data = self.data.read().await;
        let mut tenants: Vec<String> = data
            .values()
            .flat_map(|rows| rows.values())
            .filter_map(|row| row.tenant_id().map(str::to_string))
            .collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    fn row_key(key: &StoreKey) -> RowKey {
        (key.id().to_string(), key.tenant_id().map(str::to_string))
    }

    fn extract_attribute_value(data: &Value, attribute_path: &str) -> Option<String> {
        let mut current = data;
        for part in attribute_path.split('.') {
            current = match part.parse::<usize>() {
                Ok(index) => current.get(index)?,
                Err(_) => current.get(part)?,
            };
        }

        match current {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl ResourceStore for InMemoryResourceStore {
    async fn put(&self, resource: StoredResource) -> StorageResult<StoredResource> {
        let mut data = self.data.write().await;
        data.entry(resource.kind())
            .or_default()
            .insert(Self::row_key(&resource.key()), resource.clone());
        Ok(resource)
    }

    async fn insert_new(&self, resource: StoredResource) -> StorageResult<bool> {
        let mut data = self.data.write().await;
        match data.entry(resource.kind()).or_default().entry(Self::row_key(&resource.key())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(resource);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &StoreKey) -> StorageResult<Option<StoredResource>> {
        let data = self.data.read().await;
        Ok(data
            .get(&key.kind())
            .and_then(|rows| rows.get(&Self::row_key(key)))
            .cloned())
    }

    async fn delete(&self, key: &StoreKey) -> StorageResult<bool> {
        let mut data = self.data.write().await;
        Ok(data
            .get_mut(&key.kind())
            .is_some_and(|rows| rows.remove(&Self::row_key(key)).is_some()))
    }

    async fn list(&self, kind: ResourceKind) -> StorageResult<Vec<StoredResource>> {
        let data = self.data.read().await;
        Ok(data
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_attribute(
        &self,
        kind: ResourceKind,
        attribute: &str,
        value: &str,
    ) -> StorageResult<Vec<StoredResource>> {
        let data = self.data.read().await;
        Ok(data
            .get(&kind)
            .map(|rows| {
                rows.values()
                    .filter(|row| {
                        Self::extract_attribute_value(row.data(), attribute).as_deref() == Some(value)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.data.write().await.clear();
        Ok(())
    }
}
