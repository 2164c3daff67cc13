//! Tenant-scoped storage of platform resources.
//!
//! Two layers keep storage concerns apart from isolation concerns:
//!
//! * [`ResourceStore`]: a plain, tenant-unaware backend that puts, gets and
//!   lists [`StoredResource`] rows by owner, kind and id
//! * [`ScopedResources`]: the only handle request code should hold; every call
//!   takes the request's [`RequestScope`] and runs through the
//!   [`AccessEnforcer`](crate::enforcer::AccessEnforcer)
//!
//! [`TenantCache`] does the same for cached values, keying everything through
//! [`cache_key`](crate::namespace::cache_key).
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::audit::MemoryAuditSink;
//! use tenant_isolation::context::{ContextSource, RequestScope, TenantContext, TenantId};
//! use tenant_isolation::enforcer::{AccessEnforcer, ResourceKind};
//! use tenant_isolation::storage::{InMemoryResourceStore, ResourceKey, ScopedResources};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resources = ScopedResources::new(
//!     InMemoryResourceStore::new(),
//!     AccessEnforcer::new(MemoryAuditSink::new()),
//! );
//!
//! let acme = RequestScope::new(TenantContext::new(TenantId::parse("acme")?, ContextSource::Claim));
//! let globex = RequestScope::new(TenantContext::new(TenantId::parse("globex")?, ContextSource::Claim));
//!
//! resources.create(&acme, ResourceKind::Dashboard, "sales", json!({"title": "Sales"})).await?;
//!
//! let key = ResourceKey::new(ResourceKind::Dashboard, "sales");
//! assert!(resources.get(&acme, &key).await.is_ok());
//! assert!(resources.get(&globex, &key).await.is_err());
//! assert!(resources.list(&globex, ResourceKind::Dashboard).await?.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod errors;
pub mod in_memory;


pub use cache::TenantCache;
pub use errors::{StorageError, StorageResult};
pub use in_memory::{InMemoryResourceStore, InMemoryResourceStoreStats};

use crate::audit::{AuditSink, LogAuditSink};
use crate::context::RequestScope;
use crate::enforcer::{AccessEnforcer, ResourceKind, ResourceRef, TenantScoped};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Names a resource from the point of view of a request.
///
/// An unqualified key means "this kind and id within my tenant". Qualifying it
/// with an owner addresses another tenant's row, which only an admin override
/// may do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    kind: ResourceKind,
    id: String,
    owner: Option<String>,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            owner: None,
        }
    }

    /// Address the row owned by `tenant_id` rather than the caller's own.
    pub fn with_owner(mut self, tenant_id: impl Into<String>) -> Self {
        self.owner = Some(tenant_id.into());
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Where a row lives in a [`ResourceStore`].
///
/// Ids are unique per owning tenant, so two tenants may both hold
/// `dashboard/sales`. A `None` tenant addresses a legacy row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    kind: ResourceKind,
    id: String,
    tenant_id: Option<String>,
}

impl StoreKey {
    pub fn new(tenant_id: Option<&str>, kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            tenant_id: tenant_id.map(str::to_string),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// The legacy row with the same kind and id.
    pub fn as_legacy(&self) -> StoreKey {
        StoreKey {
            kind: self.kind,
            id: self.id.clone(),
            tenant_id: None,
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tenant_id {
            Some(tenant) => write!(f, "{}:{}/{}", tenant, self.kind, self.id),
            None => write!(f, "{}/{}", self.kind, self.id),
        }
    }
}

/// One persisted resource together with its owning tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResource {
    kind: ResourceKind,
    id: String,
    tenant_id: Option<String>,
    data: Value,
}

impl StoredResource {
    pub fn new(
        kind: ResourceKind,
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            tenant_id: Some(tenant_id.into()),
            data,
        }
    }

    /// A row created before tenancy existed.
    pub fn legacy(kind: ResourceKind, id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            id: id.into(),
            tenant_id: None,
            data,
        }
    }

    pub fn key(&self) -> StoreKey {
        StoreKey::new(self.tenant_id.as_deref(), self.kind, self.id.clone())
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_data(self) -> Value {
        self.data
    }
}

impl TenantScoped for StoredResource {
    fn owner_tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    fn resource_id(&self) -> String {
        self.id.clone()
    }

    fn resource_kind(&self) -> ResourceKind {
        self.kind
    }
}

/// Tenant-unaware persistence backend.
///
/// Rows are addressed by [`StoreKey`], which carries the owning tenant.
/// Implementations store rows as given and never filter by tenant; isolation
/// is applied by [`ScopedResources`] on top.
pub trait ResourceStore: Send + Sync {
    /// Insert or replace a row.
    fn put(&self, resource: StoredResource) -> impl Future<Output = StorageResult<StoredResource>> + Send;

    /// Insert a row unless one already sits at its key.
    ///
    /// Returns `false`, writing nothing, when the key is taken. The check and
    /// the write are a single atomic step.
    fn insert_new(&self, resource: StoredResource) -> impl Future<Output = StorageResult<bool>> + Send;

    fn get(&self, key: &StoreKey) -> impl Future<Output = StorageResult<Option<StoredResource>>> + Send;

    /// Remove a row, reporting whether it existed.
    fn delete(&self, key: &StoreKey) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Every row of `kind` across all owners, ordered by id.
    fn list(&self, kind: ResourceKind) -> impl Future<Output = StorageResult<Vec<StoredResource>>> + Send;

    /// Rows of `kind` whose attribute at dotted `attribute` path equals `value`.
    fn find_by_attribute(
        &self,
        kind: ResourceKind,
        attribute: &str,
        value: &str,
    ) -> impl Future<Output = StorageResult<Vec<StoredResource>>> + Send;

    fn exists(&self, key: &StoreKey) -> impl Future<Output = StorageResult<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    fn clear(&self) -> impl Future<Output = StorageResult<()>> + Send;
}

/// Enforcing facade over a [`ResourceStore`].
#[derive(Debug, Clone)]
pub struct ScopedResources<S, A: AuditSink = LogAuditSink> {
    store: S,
    enforcer: AccessEnforcer<A>,
}

impl<S: ResourceStore, A: AuditSink> ScopedResources<S, A> {
    pub fn new(store: S, enforcer: AccessEnforcer<A>) -> Self {
        Self { store, enforcer }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn enforcer(&self) -> &AccessEnforcer<A> {
        &self.enforcer
    }

    /// Create a resource owned by the scope's tenant.
    ///
    /// Ownership comes from the scope, never from the payload. Only rows the
    /// scope can already see count as a conflict, so the result never depends
    /// on another tenant's data.
    pub async fn create(
        &self,
        scope: &RequestScope,
        kind: ResourceKind,
        id: impl Into<String>,
        data: Value,
    ) -> StorageResult<StoredResource> {
        let resource = StoredResource::new(kind, id, scope.tenant_id(), data);
        let key = ResourceKey::new(kind, resource.id());

        if self.sees_legacy(scope) && self.store.exists(&resource.key().as_legacy()).await? {
            return Err(StorageError::already_exists(&key));
        }
        if !self.store.insert_new(resource.clone()).await? {
            return Err(StorageError::already_exists(&key));
        }
        log::debug!(
            "Created {} for tenant {} (request {})",
            key,
            scope.tenant_id(),
            scope.request_id()
        );
        Ok(resource)
    }

    /// Fetch a single resource.
    ///
    /// An unqualified key finds the scope tenant's row, falling back to a
    /// legacy row when the scope may see those. A key qualified with another
    /// tenant is denied and audited unless the scope has an admin override,
    /// whether or not such a row exists.
    pub async fn get(&self, scope: &RequestScope, key: &ResourceKey) -> StorageResult<StoredResource> {
        let resource = self.locate(scope, key).await?;
        self.enforcer.require_access_in_scope(scope, &resource)?;
        Ok(resource)
    }

    /// Replace a resource's payload. The owning tenant is left untouched.
    pub async fn update(
        &self,
        scope: &RequestScope,
        key: &ResourceKey,
        data: Value,
    ) -> StorageResult<StoredResource> {
        let mut resource = self.get(scope, key).await?;
        resource.data = data;
        self.store.put(resource).await
    }

    pub async fn delete(&self, scope: &RequestScope, key: &ResourceKey) -> StorageResult<()> {
        let resource = self.get(scope, key).await?;
        if !self.store.delete(&resource.key()).await? {
            return Err(StorageError::not_found(key));
        }
        log::debug!(
            "Deleted {} for tenant {} (request {})",
            resource.key(),
            scope.tenant_id(),
            scope.request_id()
        );
        Ok(())
    }

    /// Resources of `kind` visible to the scope's tenant, ordered by id.
    pub async fn list(&self, scope: &RequestScope, kind: ResourceKind) -> StorageResult<Vec<StoredResource>> {
        let rows = self.store.list(kind).await?;
        Ok(self.enforcer.filter_list(scope.context(), rows).collect())
    }

    /// A page of the visible resources. Filtering happens before paging.
    pub async fn list_page(
        &self,
        scope: &RequestScope,
        kind: ResourceKind,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<StoredResource>> {
        let rows = self.store.list(kind).await?;
        Ok(self
            .enforcer
            .filter_list(scope.context(), rows)
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Search visible resources by attribute.
    pub async fn find_by_attribute(
        &self,
        scope: &RequestScope,
        kind: ResourceKind,
        attribute: &str,
        value: &str,
    ) -> StorageResult<Vec<StoredResource>> {
        let rows = self.store.find_by_attribute(kind, attribute, value).await?;
        Ok(self.enforcer.filter_list(scope.context(), rows).collect())
    }

    /// Stamp a legacy row with the scope's tenant.
    ///
    /// Only a scope that may already see the row (the legacy owner or an
    /// admin override) can adopt it. Rows that already have an owner are
    /// returned unchanged. Adoption fails if the tenant already holds a row
    /// with the same id.
    pub async fn adopt_legacy(&self, scope: &RequestScope, key: &ResourceKey) -> StorageResult<StoredResource> {
        let legacy = self.get(scope, key).await?;
        if legacy.tenant_id.is_some() {
            return Ok(legacy);
        }

        let legacy_key = legacy.key();
        let mut adopted = legacy;
        adopted.tenant_id = Some(scope.tenant_id().to_string());
        if !self.store.insert_new(adopted.clone()).await? {
            return Err(StorageError::already_exists(key));
        }
        self.store.delete(&legacy_key).await?;
        log::info!(
            "Legacy {} assigned to tenant {} (request {})",
            key,
            scope.tenant_id(),
            scope.request_id()
        );
        Ok(adopted)
    }

    fn sees_legacy(&self, scope: &RequestScope) -> bool {
        self.enforcer.predicate(scope.context()).matches_owner(None)
    }

    /// Find the row a key names for this scope, or deny a foreign owner.
    async fn locate(&self, scope: &RequestScope, key: &ResourceKey) -> StorageResult<StoredResource> {
        let owner = key.owner().unwrap_or(scope.tenant_id());
        if owner != scope.tenant_id() {
            // decided from the key alone, never from the other tenant's rows
            let target = ResourceRef::new(key.kind(), key.id(), owner);
            self.enforcer.require_access_in_scope(scope, &target)?;
        }

        let owned = StoreKey::new(Some(owner), key.kind(), key.id());
        if let Some(resource) = self.store.get(&owned).await? {
            return Ok(resource);
        }
        if key.owner().is_none() && self.sees_legacy(scope) {
            if let Some(resource) = self.store.get(&owned.as_legacy()).await? {
                return Ok(resource);
            }
        }
        Err(StorageError::not_found(key))
    }
}
