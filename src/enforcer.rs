//! Access control enforcement for tenant-scoped resources.
//!
//! Two primitives cover every data-access shape:
//!
//! * [`AccessEnforcer::filter_list`] for bulk listings: drops foreign
//!   resources silently and lazily
//! * [`AccessEnforcer::check_access`] for single-object access: returns a
//!   decision, and a denial is audited
//!
//! Both evaluate the same [`TenantPredicate`] that
//! [`filter_clause`](crate::namespace::filter_clause) renders into SQL, so
//! list-time, access-time and storage-time enforcement cannot drift apart.
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::context::{ContextSource, TenantContext, TenantId};
//! use tenant_isolation::enforcer::{AccessDecision, AccessEnforcer, ResourceKind, ResourceRef};
//! use tenant_isolation::audit::MemoryAuditSink;
//!
//! let audit = MemoryAuditSink::new();
//! let enforcer = AccessEnforcer::new(audit.clone());
//! let context = TenantContext::new(TenantId::parse("tenant1").unwrap(), ContextSource::Claim);
//!
//! let dashboards = vec![
//!     ResourceRef::new(ResourceKind::Dashboard, "1", "tenant1"),
//!     ResourceRef::new(ResourceKind::Dashboard, "2", "tenant2"),
//! ];
//! let visible: Vec<_> = enforcer.filter_list(&context, &dashboards).collect();
//! assert_eq!(visible.len(), 1);
//!
//! assert!(enforcer.check_access(&context, &dashboards[1]).is_denied());
//! assert_eq!(audit.len(), 1);
//! ```

use crate::audit::{AuditEvent, AuditSink, LogAuditSink};
use crate::context::{RequestScope, TenantContext, TenantId};
use crate::error::{TenancyError, TenancyResult};
use crate::namespace::TenantPredicate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Kinds of tenant-owned resources on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Database connection definition
    Connection,
    Dashboard,
    Chart,
    /// Dataset / physical table definition
    Table,
    SavedQuery,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Connection,
        ResourceKind::Dashboard,
        ResourceKind::Chart,
        ResourceKind::Table,
        ResourceKind::SavedQuery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Connection => "connection",
            ResourceKind::Dashboard => "dashboard",
            ResourceKind::Chart => "chart",
            ResourceKind::Table => "table",
            ResourceKind::SavedQuery => "saved_query",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything owned by a tenant.
///
/// `owner_tenant_id` is fixed at creation. `None` marks a legacy row that
/// predates tenancy; it belongs to the configured default tenant until migrated.
pub trait TenantScoped {
    fn owner_tenant_id(&self) -> Option<&str>;
    fn resource_id(&self) -> String;
    fn resource_kind(&self) -> ResourceKind;
}

impl<T: TenantScoped + ?Sized> TenantScoped for &T {
    fn owner_tenant_id(&self) -> Option<&str> {
        (**self).owner_tenant_id()
    }

    fn resource_id(&self) -> String {
        (**self).resource_id()
    }

    fn resource_kind(&self) -> ResourceKind {
        (**self).resource_kind()
    }
}

impl<T: TenantScoped + ?Sized> TenantScoped for Arc<T> {
    fn owner_tenant_id(&self) -> Option<&str> {
        (**self).owner_tenant_id()
    }

    fn resource_id(&self) -> String {
        (**self).resource_id()
    }

    fn resource_kind(&self) -> ResourceKind {
        (**self).resource_kind()
    }
}

/// Lightweight descriptor of a tenant-owned resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
    pub tenant_id: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            tenant_id: Some(tenant_id.into()),
        }
    }

    /// A resource created before tenancy existed.
    pub fn legacy(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            tenant_id: None,
        }
    }
}

impl TenantScoped for ResourceRef {
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

/// Why an access attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    CrossTenantAccess,
}

/// Outcome of a single-object access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a denied access must abort the operation"]
pub enum AccessDecision {
    Allowed,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }

    pub fn is_denied(self) -> bool {
        !self.is_allowed()
    }
}

/// Lazy, order-preserving tenant filter over any iterator of resources.
///
/// Cloning the adapter (possible whenever the source iterator is `Clone`)
/// restarts the filtered sequence from the clone point.
#[derive(Debug, Clone)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct TenantFiltered<I> {
    inner: I,
    predicate: TenantPredicate,
}

impl<I> Iterator for TenantFiltered<I>
where
    I: Iterator,
    I::Item: TenantScoped,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let predicate = &self.predicate;
        self.inner.find(|resource| predicate.matches(resource))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (_, upper) = self.inner.size_hint();
        if self.predicate.is_tautology() {
            self.inner.size_hint()
        } else {
            (0, upper)
        }
    }
}

impl<I> DoubleEndedIterator for TenantFiltered<I>
where
    I: DoubleEndedIterator,
    I::Item: TenantScoped,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        let predicate = &self.predicate;
        self.inner.rfind(|resource| predicate.matches(resource))
    }
}

impl<I> FusedIterator for TenantFiltered<I>
where
    I: FusedIterator,
    I::Item: TenantScoped,
{
}

/// Applies a resolved [`TenantContext`] to resources.
#[derive(Debug, Clone)]
pub struct AccessEnforcer<A: AuditSink = LogAuditSink> {
    legacy_owner: Option<TenantId>,
    audit: A,
}

impl Default for AccessEnforcer<LogAuditSink> {
    fn default() -> Self {
        Self::new(LogAuditSink)
    }
}

impl<A: AuditSink> AccessEnforcer<A> {
    /// Create an enforcer that reports denials to `audit`.
    pub fn new(audit: A) -> Self {
        Self {
            legacy_owner: None,
            audit,
        }
    }

    /// Treat tenant-less legacy resources as owned by `tenant`.
    pub fn with_legacy_owner(mut self, tenant: Option<TenantId>) -> Self {
        self.legacy_owner = tenant;
        self
    }

    pub fn legacy_owner(&self) -> Option<&TenantId> {
        self.legacy_owner.as_ref()
    }

    pub fn audit_sink(&self) -> &A {
        &self.audit
    }

    /// The predicate every enforcement path evaluates for `context`.
    pub fn predicate(&self, context: &TenantContext) -> TenantPredicate {
        TenantPredicate::for_context(context, self.legacy_owner.as_ref().map(TenantId::as_str))
    }

    /// Keep only resources owned by the acting tenant, preserving order.
    ///
    /// With an admin override every resource passes. The input is never
    /// modified; nothing is evaluated until the result is iterated.
    pub fn filter_list<I>(&self, context: &TenantContext, resources: I) -> TenantFiltered<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: TenantScoped,
    {
        TenantFiltered {
            inner: resources.into_iter(),
            predicate: self.predicate(context),
        }
    }

    /// Decide whether `context` may touch `resource`, auditing any denial.
    pub fn check_access<R>(&self, context: &TenantContext, resource: &R) -> AccessDecision
    where
        R: TenantScoped + ?Sized,
    {
        self.decide(context, resource, None)
    }

    /// As [`check_access`](Self::check_access), correlating the audit event with the request.
    pub fn check_access_in_scope<R>(&self, scope: &RequestScope, resource: &R) -> AccessDecision
    where
        R: TenantScoped + ?Sized,
    {
        self.decide(scope.context(), resource, Some(scope))
    }

    /// Check access and turn a denial into an error for `?` propagation.
    pub fn require_access<R>(&self, context: &TenantContext, resource: &R) -> TenancyResult<()>
    where
        R: TenantScoped + ?Sized,
    {
        Self::into_result(self.check_access(context, resource), context, resource)
    }

    /// As [`require_access`](Self::require_access) within a request scope.
    pub fn require_access_in_scope<R>(&self, scope: &RequestScope, resource: &R) -> TenancyResult<()>
    where
        R: TenantScoped + ?Sized,
    {
        Self::into_result(
            self.check_access_in_scope(scope, resource),
            scope.context(),
            resource,
        )
    }

    fn decide<R>(
        &self,
        context: &TenantContext,
        resource: &R,
        scope: Option<&RequestScope>,
    ) -> AccessDecision
    where
        R: TenantScoped + ?Sized,
    {
        if self.predicate(context).matches(resource) {
            if context.is_admin_override()
                && resource.owner_tenant_id() != Some(context.tenant_id())
            {
                log::debug!(
                    "Admin override on {} {} (owner {:?}) by tenant {}",
                    resource.resource_kind(),
                    resource.resource_id(),
                    resource.owner_tenant_id(),
                    context.tenant_id()
                );
            }
            return AccessDecision::Allowed;
        }

        let mut event = AuditEvent::cross_tenant_denial(
            context.tenant_id(),
            resource.resource_kind(),
            resource.resource_id(),
            resource.owner_tenant_id().map(str::to_string),
        );
        if let Some(scope) = scope {
            event = event
                .with_request_id(scope.request_id())
                .with_actor_fingerprint(scope.actor_fingerprint().map(str::to_string));
        }
        self.audit.record(event);

        AccessDecision::Denied(DenialReason::CrossTenantAccess)
    }

    fn into_result<R>(
        decision: AccessDecision,
        context: &TenantContext,
        resource: &R,
    ) -> TenancyResult<()>
    where
        R: TenantScoped + ?Sized,
    {
        match decision {
            AccessDecision::Allowed => Ok(()),
            AccessDecision::Denied(DenialReason::CrossTenantAccess) => {
                Err(TenancyError::cross_tenant_access(
                    context.tenant_id(),
                    resource.resource_kind(),
                    resource.resource_id(),
                ))
            }
        }
    }
}
