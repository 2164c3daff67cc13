//! Tenant registry: the authoritative list of tenants.
//!
//! The registry is read on every request and written rarely. Readers go
//! through the [`TenantRegistry`] trait; where rows come from is the business
//! of a [`RegistryStore`].
//!
//! * [`InMemoryRegistryStore`] holds entries in memory and exposes the
//!   administrative write path
//! * [`JsonFileRegistryStore`] loads entries from a JSON document on disk
//! * [`CachedTenantRegistry`] serves lookups from a snapshot of any store and
//!   refreshes it in the background
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::context::TenantId;
//! use tenant_isolation::registry::{InMemoryRegistryStore, TenantRegistry, TenantRegistryEntry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryRegistryStore::builder()
//!     .with_entry(TenantRegistryEntry::new(TenantId::parse("acme")?, "Acme Corp"))
//!     .build();
//!
//! let entry = store.lookup("acme").await?.expect("registered");
//! assert_eq!(entry.storage_namespace(), "acme");
//! assert!(store.lookup("ghost").await?.is_none());
//! # Ok(())
//! # }
//! ```

pub mod cached;
pub mod file;
pub mod in_memory;

pub use cached::{CachedTenantRegistry, RefreshTask};
pub use file::JsonFileRegistryStore;
pub use in_memory::{InMemoryRegistryStore, InMemoryRegistryStoreBuilder};

use crate::context::TenantId;
use crate::error::{RegistryStoreError, RegistryStoreResult, TenancyResult};
use crate::namespace::{default_namespace, is_valid_namespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// One registered tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRegistryEntry {
    tenant_id: TenantId,
    display_name: String,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(default)]
    storage_namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default = "Utc::now")]
    created_on: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    changed_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    configuration: Value,
}

fn default_active() -> bool {
    true
}

impl TenantRegistryEntry {
    /// Create an active entry whose namespace is derived from the tenant id.
    pub fn new(tenant_id: TenantId, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            storage_namespace: default_namespace(&tenant_id),
            tenant_id,
            display_name: display_name.into(),
            is_active: true,
            description: None,
            created_on: now,
            changed_on: now,
            configuration: Value::Null,
        }
    }

    /// Assign an explicit storage namespace.
    pub fn with_storage_namespace(mut self, namespace: impl Into<String>) -> RegistryStoreResult<Self> {
        let namespace = namespace.into();
        if !is_valid_namespace(&namespace) {
            return Err(RegistryStoreError::invalid_entry(
                self.tenant_id.as_str(),
                format!("'{}' is not a valid storage namespace", namespace),
            ));
        }
        self.storage_namespace = namespace;
        Ok(self)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach free-form tenant configuration.
    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Mark the entry inactive.
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn storage_namespace(&self) -> &str {
        &self.storage_namespace
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn changed_on(&self) -> DateTime<Utc> {
        self.changed_on
    }

    pub fn configuration(&self) -> &Value {
        &self.configuration
    }

    /// Check the invariants a store must uphold before serving the entry.
    ///
    /// An empty namespace (as left by a document that omitted it) is filled
    /// with the default derived from the tenant id.
    pub fn validate(mut self) -> RegistryStoreResult<Self> {
        if self.display_name.trim().is_empty() {
            return Err(RegistryStoreError::invalid_entry(
                self.tenant_id.as_str(),
                "display name must not be empty",
            ));
        }
        self = self.with_namespace_filled();
        if !is_valid_namespace(&self.storage_namespace) {
            return Err(RegistryStoreError::invalid_entry(
                self.tenant_id.as_str(),
                format!(
                    "'{}' is not a valid storage namespace",
                    self.storage_namespace
                ),
            ));
        }
        Ok(self)
    }

    /// Replace an empty storage namespace with the tenant's default one.
    pub(crate) fn with_namespace_filled(mut self) -> Self {
        if self.storage_namespace.is_empty() {
            self.storage_namespace = default_namespace(&self.tenant_id);
        }
        self
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
        self.changed_on = Utc::now();
    }

    pub(crate) fn carry_history_from(&mut self, previous: &TenantRegistryEntry) {
        self.created_on = previous.created_on;
        self.changed_on = Utc::now();
    }
}

/// Read access to registered tenants.
///
/// `lookup` answers `Ok(None)` for an unregistered tenant; errors are reserved
/// for an unreachable registry and always fail closed.
pub trait TenantRegistry: Send + Sync {
    /// Find the entry for `tenant_id`, active or not.
    fn lookup(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = TenancyResult<Option<TenantRegistryEntry>>> + Send;

    /// All active entries, ordered by tenant id.
    fn list_active(&self) -> impl Future<Output = TenancyResult<Vec<TenantRegistryEntry>>> + Send;
}

/// Backing source of registry rows.
pub trait RegistryStore: Send + Sync {
    /// Load every registered tenant.
    fn load_all(&self) -> impl Future<Output = RegistryStoreResult<Vec<TenantRegistryEntry>>> + Send;
}

pub(crate) fn sorted_active<'a, I>(entries: I) -> Vec<TenantRegistryEntry>
where
    I: IntoIterator<Item = &'a TenantRegistryEntry>,
{
    let mut active: Vec<_> = entries
        .into_iter()
        .filter(|entry| entry.is_active())
        .cloned()
        .collect();
    active.sort_by(|a, b| a.tenant_id().cmp(b.tenant_id()));
    active
}
