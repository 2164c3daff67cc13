//! Multi-tenant isolation for shared analytics platforms.
//!
//! Confines every request to its tenant's connections, dashboards, charts,
//! tables and saved queries, and keeps tenants apart in shared caches and
//! databases.
//!
//! # Core Components
//!
//! - [`TenantContextResolver`] - Derives the acting tenant from claims, headers, host or default
//! - [`AccessEnforcer`] - Filters listings and checks single-object access
//! - [`TenantRegistry`] - Authoritative tenant list, with [`CachedTenantRegistry`] for serving
//! - [`namespace`] - Cache keys, connection routes and SQL row filters
//! - [`TenantIsolation`] - Facade implementing the [`TenantGuard`] capability
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tenant_isolation::{TenancyConfig, TenantIsolation, TenantGuard};
//! use tenant_isolation::audit::LogAuditSink;
//! use tenant_isolation::identity::InboundRequest;
//! use tenant_isolation::registry::{CachedTenantRegistry, JsonFileRegistryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TenancyConfig::from_json_file("tenancy.json")?;
//! let registry = CachedTenantRegistry::load(JsonFileRegistryStore::new("tenants.json"), &config).await?;
//! let _refresh = registry.spawn_refresh();
//!
//! let isolation = TenantIsolation::new(config, registry, LogAuditSink)?;
//! let context = isolation.resolve(&InboundRequest::new().with_host("acme.analytics.example.com")).await?;
//! println!("acting tenant: {}", context.tenant_id());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod enforcer;
pub mod error;
pub mod guard;
pub mod identity;
pub mod migration;
pub mod namespace;
pub mod registry;
pub mod resolver;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::TenancyConfig;
pub use context::{ContextSource, RequestScope, TenantContext, TenantId};
pub use enforcer::{AccessDecision, AccessEnforcer, DenialReason, ResourceKind, TenantScoped};
pub use error::{ErrorKind, TenancyError, TenancyResult};
pub use guard::{TenantGuard, TenantIsolation};
pub use namespace::{cache_key, connection_route, filter_clause};
pub use registry::{CachedTenantRegistry, TenantRegistry, TenantRegistryEntry};
pub use resolver::TenantContextResolver;
