//! Shared fixtures for the integration suite.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tenant_isolation::audit::MemoryAuditSink;
use tenant_isolation::config::TenancyConfig;
use tenant_isolation::context::{ContextSource, RequestScope, TenantContext, TenantId};
use tenant_isolation::error::{RegistryStoreError, RegistryStoreResult};
use tenant_isolation::guard::TenantIsolation;
use tenant_isolation::identity::{
    AuthenticatedIdentity, ClaimVerifier, Claims, InboundRequest, UpstreamVerified,
};
use tenant_isolation::registry::{InMemoryRegistryStore, RegistryStore, TenantRegistryEntry};

pub mod fixtures;

/// Route library logs to the test harness; safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).expect("fixture tenant ids are valid")
}

pub fn context(id: &str) -> TenantContext {
    TenantContext::new(tenant(id), ContextSource::Claim)
}

pub fn admin_context(id: &str) -> TenantContext {
    TenantContext::with_admin_override(tenant(id), ContextSource::Claim)
}

pub fn scope(id: &str) -> RequestScope {
    RequestScope::new(context(id))
}

/// Identity whose verified `tenant_id` claim is `tenant`.
pub fn identity(subject: &str, tenant: &str) -> AuthenticatedIdentity {
    let claims = UpstreamVerified
        .verify(Claims::new().insert("tenant_id", tenant))
        .expect("upstream verification accepts any claims");
    AuthenticatedIdentity::new(subject, claims)
}

pub fn claim_request(tenant: &str) -> InboundRequest {
    InboundRequest::new().with_identity(identity("alice", tenant))
}

pub fn admin_request(tenant: &str) -> InboundRequest {
    InboundRequest::new().with_identity(identity("root", tenant).with_administrator_capability())
}

/// `tenant1`, `acme` and `globex` active; `tenant2` inactive.
pub fn standard_registry() -> InMemoryRegistryStore {
    InMemoryRegistryStore::builder()
        .with_entry(TenantRegistryEntry::new(tenant("tenant1"), "Tenant One"))
        .with_entry(TenantRegistryEntry::new(tenant("tenant2"), "Tenant Two").deactivated())
        .with_entry(
            TenantRegistryEntry::new(tenant("acme"), "Acme Corp")
                .with_storage_namespace("acme_data")
                .expect("valid namespace"),
        )
        .with_entry(TenantRegistryEntry::new(tenant("globex"), "Globex"))
        .build()
}

pub fn isolation(config: TenancyConfig) -> TenantIsolation<InMemoryRegistryStore, MemoryAuditSink> {
    TenantIsolation::new(config, standard_registry(), MemoryAuditSink::new())
        .expect("fixture config is valid")
}

/// Registry store that can be switched off and counts loads.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    pub inner: InMemoryRegistryStore,
    down: Arc<AtomicBool>,
    loads: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub async fn with_tenants(ids: &[&str]) -> Self {
        let store = Self::default();
        for id in ids {
            store
                .inner
                .upsert(TenantRegistryEntry::new(tenant(id), *id))
                .await
                .expect("fixture entry is valid");
        }
        store
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl RegistryStore for FlakyStore {
    async fn load_all(&self) -> RegistryStoreResult<Vec<TenantRegistryEntry>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(RegistryStoreError::unavailable("connection refused"));
        }
        self.inner.load_all().await
    }
}
