//! Registry store backed by a JSON document.
//!
//! The document is an array of entries using the camelCase field names of
//! [`TenantRegistryEntry`]. It is re-read on every `load_all`, so edits on disk
//! are picked up by the next refresh of a [`CachedTenantRegistry`](super::CachedTenantRegistry).

use super::{RegistryStore, TenantRegistryEntry};
use crate::error::{RegistryStoreError, RegistryStoreResult};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonFileRegistryStore {
    path: PathBuf,
}

impl JsonFileRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for JsonFileRegistryStore {
    async fn load_all(&self) -> RegistryStoreResult<Vec<TenantRegistryEntry>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RegistryStoreError::unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            RegistryStoreError::unavailable(format!("{}: {}", self.path.display(), e))
        })
    }
}
