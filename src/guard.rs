//! The tenant guard capability and the facade that wires everything together.
//!
//! Request-handling code depends on [`TenantGuard`] rather than on a concrete
//! resolver or enforcer. [`TenantIsolation`] is the standard implementation:
//! it owns a [`TenantContextResolver`] and an [`AccessEnforcer`] configured
//! from one [`TenancyConfig`].
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::audit::MemoryAuditSink;
//! use tenant_isolation::config::TenancyConfig;
//! use tenant_isolation::context::TenantId;
//! use tenant_isolation::enforcer::{ResourceKind, ResourceRef};
//! use tenant_isolation::guard::{TenantGuard, TenantIsolation};
//! use tenant_isolation::identity::{AuthenticatedIdentity, ClaimVerifier, Claims, InboundRequest, UpstreamVerified};
//! use tenant_isolation::registry::{InMemoryRegistryStore, TenantRegistryEntry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = InMemoryRegistryStore::builder()
//!     .with_entry(TenantRegistryEntry::new(TenantId::parse("acme")?, "Acme"))
//!     .build();
//! let isolation = TenantIsolation::new(TenancyConfig::default(), registry, MemoryAuditSink::new())?;
//!
//! let claims = UpstreamVerified.verify(Claims::new().insert("tenant_id", "acme"))?;
//! let request = InboundRequest::new().with_identity(AuthenticatedIdentity::new("alice", claims));
//! let context = isolation.resolve(&request).await?;
//!
//! let charts = vec![
//!     ResourceRef::new(ResourceKind::Chart, "1", "acme"),
//!     ResourceRef::new(ResourceKind::Chart, "2", "globex"),
//! ];
//! assert_eq!(isolation.filter_list(&context, &charts).count(), 1);
//! # Ok(())
//! # }
//! ```

use crate::audit::{AuditSink, LogAuditSink};
use crate::config::TenancyConfig;
use crate::context::{RequestScope, TenantContext};
use crate::enforcer::{AccessDecision, AccessEnforcer, TenantFiltered, TenantScoped};
use crate::error::{ConfigurationResult, TenancyResult};
use crate::identity::InboundRequest;
use crate::namespace::{self, ConnectionRoute, TenantPredicate};
use crate::registry::TenantRegistry;
use crate::resolver::TenantContextResolver;
use std::future::Future;

/// Capability to resolve tenants and enforce isolation.
pub trait TenantGuard: Send + Sync {
    /// Establish the acting tenant for a request.
    fn resolve(
        &self,
        request: &InboundRequest,
    ) -> impl Future<Output = TenancyResult<TenantContext>> + Send;

    /// Lazily keep only the resources `context` may see.
    fn filter_list<I>(&self, context: &TenantContext, resources: I) -> TenantFiltered<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: TenantScoped;

    /// Decide single-object access; denials are audited.
    fn check_access<R>(&self, context: &TenantContext, resource: &R) -> AccessDecision
    where
        R: TenantScoped + ?Sized;
}

/// Resolver and enforcer built from one configuration.
#[derive(Debug, Clone)]
pub struct TenantIsolation<R, A: AuditSink = LogAuditSink> {
    resolver: TenantContextResolver<R>,
    enforcer: AccessEnforcer<A>,
}

impl<R: TenantRegistry, A: AuditSink> TenantIsolation<R, A> {
    /// Validate `config` and build the resolver and enforcer.
    ///
    /// The configured default tenant also owns legacy resources.
    pub fn new(config: TenancyConfig, registry: R, audit: A) -> ConfigurationResult<Self> {
        let enforcer = AccessEnforcer::new(audit).with_legacy_owner(config.default_tenant());
        let resolver = TenantContextResolver::new(config, registry)?;
        Ok(Self { resolver, enforcer })
    }

    pub fn resolver(&self) -> &TenantContextResolver<R> {
        &self.resolver
    }

    pub fn enforcer(&self) -> &AccessEnforcer<A> {
        &self.enforcer
    }

    pub fn registry(&self) -> &R {
        self.resolver.registry()
    }

    pub fn config(&self) -> &TenancyConfig {
        self.resolver.config()
    }

    /// Resolve a request into a [`RequestScope`].
    pub async fn resolve_scope(&self, request: &InboundRequest) -> TenancyResult<RequestScope> {
        self.resolver.resolve_scope(request).await
    }

    /// As [`check_access`](TenantGuard::check_access), as a `Result`.
    pub fn require_access<T>(&self, context: &TenantContext, resource: &T) -> TenancyResult<()>
    where
        T: TenantScoped + ?Sized,
    {
        self.enforcer.require_access(context, resource)
    }

    /// Row filter for queries made on behalf of `context`.
    pub fn filter_clause(&self, context: &TenantContext) -> TenantPredicate {
        self.enforcer.predicate(context)
    }

    /// Cache key for `base_key` under the context's tenant.
    pub fn cache_key(&self, context: &TenantContext, base_key: &str) -> String {
        namespace::cache_key(base_key, context.tenant())
    }

    /// Storage route for the context's tenant.
    pub async fn connection_route(&self, context: &TenantContext) -> TenancyResult<ConnectionRoute> {
        namespace::connection_route(self.resolver.registry(), context.tenant_id()).await
    }
}

impl<R: TenantRegistry, A: AuditSink> TenantGuard for TenantIsolation<R, A> {
    async fn resolve(&self, request: &InboundRequest) -> TenancyResult<TenantContext> {
        self.resolver.resolve(request).await
    }

    fn filter_list<I>(&self, context: &TenantContext, resources: I) -> TenantFiltered<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: TenantScoped,
    {
        self.enforcer.filter_list(context, resources)
    }

    fn check_access<T>(&self, context: &TenantContext, resource: &T) -> AccessDecision
    where
        T: TenantScoped + ?Sized,
    {
        self.enforcer.check_access(context, resource)
    }
}
