//! Cached registry behaviour as seen through resolution.

use crate::common::{FlakyStore, claim_request, init_logging, tenant};
use std::time::Duration;
use tenant_isolation::audit::MemoryAuditSink;
use tenant_isolation::config::TenancyConfig;
use tenant_isolation::error::ErrorKind;
use tenant_isolation::guard::{TenantGuard, TenantIsolation};
use tenant_isolation::registry::{
    CachedTenantRegistry, JsonFileRegistryStore, TenantRegistry, TenantRegistryEntry,
};

const REFRESH: Duration = Duration::from_secs(30);
const STALENESS: Duration = Duration::from_secs(120);

fn config() -> TenancyConfig {
    TenancyConfig::builder()
        .registry_refresh_interval_secs(REFRESH.as_secs())
        .registry_max_staleness_secs(STALENESS.as_secs())
        .build()
        .unwrap()
}

async fn guarded(
    store: FlakyStore,
) -> TenantIsolation<CachedTenantRegistry<FlakyStore>, MemoryAuditSink> {
    let config = config();
    let registry = CachedTenantRegistry::load(store, &config).await.unwrap();
    TenantIsolation::new(config, registry, MemoryAuditSink::new()).unwrap()
}

// Let spawned tasks run after the clock moves.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_deactivation_applies_after_refresh_interval() {
    init_logging();
    let store = FlakyStore::with_tenants(&["acme"]).await;
    let isolation = guarded(store.clone()).await;
    assert!(isolation.resolve(&claim_request("acme")).await.is_ok());

    store.inner.set_active("acme", false).await.unwrap();
    // Still within the refresh interval: the snapshot is served as-is.
    assert!(isolation.resolve(&claim_request("acme")).await.is_ok());

    tokio::time::advance(REFRESH + Duration::from_secs(1)).await;
    let err = isolation.resolve(&claim_request("acme")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InactiveTenant);
}

#[tokio::test(start_paused = true)]
async fn test_outage_serves_last_snapshot_then_fails_closed() {
    init_logging();
    let store = FlakyStore::with_tenants(&["acme"]).await;
    let isolation = guarded(store.clone()).await;
    store.set_down(true);

    tokio::time::advance(REFRESH + Duration::from_secs(1)).await;
    assert!(isolation.resolve(&claim_request("acme")).await.is_ok());

    // One failed reload, then the snapshot is served without retrying.
    let requests: Vec<_> = (0..20).map(|_| claim_request("acme")).collect();
    let resolved = futures::future::join_all(requests.iter().map(|r| isolation.resolve(r))).await;
    assert!(resolved.iter().all(Result::is_ok));
    assert_eq!(store.loads(), 2);

    tokio::time::advance(STALENESS).await;
    let err = isolation.resolve(&claim_request("acme")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RegistryUnavailable);
    assert!(err.is_request_fatal());

    store.set_down(false);
    assert!(isolation.resolve(&claim_request("acme")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_background_refresh_picks_up_new_tenants() {
    init_logging();
    let store = FlakyStore::with_tenants(&["acme"]).await;
    let isolation = guarded(store.clone()).await;
    let task = isolation.registry().spawn_refresh();
    assert_eq!(store.loads(), 1);

    store
        .inner
        .upsert(TenantRegistryEntry::new(tenant("globex"), "Globex"))
        .await
        .unwrap();

    tokio::time::advance(REFRESH + Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(store.loads(), 2);

    // Served from the refreshed snapshot without an inline reload.
    assert!(isolation.resolve(&claim_request("globex")).await.is_ok());
    assert_eq!(store.loads(), 2);

    drop(task);
    tokio::time::advance(REFRESH * 3).await;
    settle().await;
    assert_eq!(store.loads(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_background_refresh_survives_store_errors() {
    init_logging();
    let store = FlakyStore::with_tenants(&["acme"]).await;
    let isolation = guarded(store.clone()).await;
    let task = isolation.registry().spawn_refresh();

    store.set_down(true);
    tokio::time::advance(REFRESH + Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(store.loads(), 2);
    assert!(!task.is_finished());

    store.set_down(false);
    tokio::time::advance(REFRESH).await;
    settle().await;
    assert_eq!(store.loads(), 3);
    assert!(isolation.registry().snapshot_age().await.unwrap() < REFRESH);
}

#[tokio::test]
async fn test_registry_from_json_file() {
    let path = std::env::temp_dir().join(format!("tenant-registry-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"[
            {"tenantId": "acme", "displayName": "Acme", "storageNamespace": "acme_data"},
            {"tenantId": "tenant2", "displayName": "Two", "isActive": false},
            {"tenantId": "broken", "displayName": "Bad", "storageNamespace": "no spaces allowed"}
        ]"#,
    )
    .unwrap();

    let registry = CachedTenantRegistry::load(JsonFileRegistryStore::new(&path), &config())
        .await
        .unwrap();
    let active = registry.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].storage_namespace(), "acme_data");
    assert!(!registry.lookup("tenant2").await.unwrap().unwrap().is_active());
    assert!(registry.lookup("broken").await.unwrap().is_none());

    std::fs::remove_file(&path).unwrap();
}
