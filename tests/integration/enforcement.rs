//! Listing and single-object enforcement, with auditing.

use crate::common::fixtures::{ids, mixed_catalogue};
use crate::common::{admin_request, claim_request, init_logging, isolation, scope, standard_registry};
use serde_json::json;
use tenant_isolation::audit::{AuditOutcome, ChannelAuditSink, MemoryAuditSink};
use tenant_isolation::config::TenancyConfig;
use tenant_isolation::enforcer::{AccessDecision, AccessEnforcer, DenialReason, ResourceKind, ResourceRef};
use tenant_isolation::error::ErrorKind;
use tenant_isolation::guard::{TenantGuard, TenantIsolation};
use tenant_isolation::storage::{InMemoryResourceStore, ResourceKey, ScopedResources, StorageError};

#[tokio::test]
async fn test_filter_list_keeps_only_own_rows_in_order() {
    init_logging();
    let isolation = isolation(TenancyConfig::default());
    let context = isolation.resolve(&claim_request("acme")).await.unwrap();
    let catalogue = mixed_catalogue();

    let visible: Vec<_> = isolation.filter_list(&context, &catalogue).collect();
    assert_eq!(ids(visible.iter().copied()), vec!["d2", "c1", "db1"]);
    assert_eq!(catalogue.len(), 7);
}

#[tokio::test]
async fn test_admin_bypass_lists_everything() {
    init_logging();
    let config = TenancyConfig::builder().admin_bypass_enabled(true).build().unwrap();
    let isolation = isolation(config);
    let context = isolation.resolve(&admin_request("tenant1")).await.unwrap();
    let catalogue = mixed_catalogue();

    let visible: Vec<_> = isolation.filter_list(&context, &catalogue).cloned().collect();
    assert_eq!(visible, catalogue);
    assert!(
        catalogue
            .iter()
            .all(|r| isolation.check_access(&context, r).is_allowed())
    );
    assert!(isolation.enforcer().audit_sink().is_empty());
}

#[tokio::test]
async fn test_cross_tenant_check_is_denied_and_audited_once() {
    init_logging();
    let isolation = isolation(TenancyConfig::default());
    let context = isolation.resolve(&claim_request("tenant1")).await.unwrap();
    let foreign = ResourceRef::new(ResourceKind::Dashboard, "42", "acme");

    assert_eq!(
        isolation.check_access(&context, &foreign),
        AccessDecision::Denied(DenialReason::CrossTenantAccess)
    );

    let events = isolation.enforcer().audit_sink().events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.tenant_attempted, "tenant1");
    assert_eq!(event.resource_id, "42");
    assert_eq!(event.resource_kind, ResourceKind::Dashboard);
    assert_eq!(event.resource_tenant.as_deref(), Some("acme"));
    assert_eq!(event.outcome, AuditOutcome::Denied);

    let own = ResourceRef::new(ResourceKind::Dashboard, "7", "tenant1");
    assert!(isolation.check_access(&context, &own).is_allowed());
    assert_eq!(isolation.enforcer().audit_sink().len(), 1);
}

#[tokio::test]
async fn test_require_access_aborts_with_cross_tenant_error() {
    let isolation = isolation(TenancyConfig::default());
    let context = isolation.resolve(&claim_request("globex")).await.unwrap();
    let foreign = ResourceRef::new(ResourceKind::SavedQuery, "q1", "tenant1");

    let err = isolation.require_access(&context, &foreign).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CrossTenantAccess);
    assert!(!err.is_request_fatal());
    assert!(err.to_string().contains("q1"));
}

#[tokio::test]
async fn test_audit_events_stream_through_channel() {
    let (sink, mut events) = ChannelAuditSink::new();
    let isolation = TenantIsolation::new(TenancyConfig::default(), standard_registry(), sink).unwrap();
    let context = isolation.resolve(&claim_request("acme")).await.unwrap();

    let foreign = ResourceRef::new(ResourceKind::Chart, "c2", "globex");
    assert!(isolation.check_access(&context, &foreign).is_denied());

    let event = events.recv().await.unwrap();
    assert_eq!(event.resource_id, "c2");
    let serialized = serde_json::to_value(&event).unwrap();
    assert_eq!(serialized["tenantAttempted"], json!("acme"));
    assert_eq!(serialized["resourceKind"], json!("chart"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_scoped_storage_end_to_end() {
    init_logging();
    let audit = MemoryAuditSink::new();
    let resources = ScopedResources::new(InMemoryResourceStore::new(), AccessEnforcer::new(audit.clone()));
    let acme = scope("acme");
    let globex = scope("globex");

    resources
        .create(&acme, ResourceKind::Dashboard, "sales", json!({"title": "Sales"}))
        .await
        .unwrap();
    resources
        .create(&globex, ResourceKind::Dashboard, "ops", json!({"title": "Ops"}))
        .await
        .unwrap();

    let listed = resources.list(&acme, ResourceKind::Dashboard).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), "sales");

    let key = ResourceKey::new(ResourceKind::Dashboard, "ops").with_owner("globex");
    match resources.get(&acme, &key).await {
        Err(StorageError::Tenancy(err)) => assert_eq!(err.kind(), ErrorKind::CrossTenantAccess),
        other => panic!("expected a cross-tenant denial, got {:?}", other),
    }
    assert_eq!(audit.events()[0].request_id.as_deref(), Some(acme.request_id()));
}

#[tokio::test]
async fn test_create_reveals_nothing_about_other_tenants_ids() {
    init_logging();
    let audit = MemoryAuditSink::new();
    let resources = ScopedResources::new(InMemoryResourceStore::new(), AccessEnforcer::new(audit.clone()));
    let acme = scope("acme");
    let globex = scope("globex");

    resources
        .create(&acme, ResourceKind::Chart, "secret-merger", json!({"title": "Plans"}))
        .await
        .unwrap();

    // Globex sees the same outcomes it would for an id nobody uses.
    let key = ResourceKey::new(ResourceKind::Chart, "secret-merger");
    assert!(matches!(
        resources.get(&globex, &key).await,
        Err(StorageError::ResourceNotFound { .. })
    ));
    let created = resources
        .create(&globex, ResourceKind::Chart, "secret-merger", json!({"title": "Mine"}))
        .await
        .unwrap();
    assert_eq!(created.tenant_id(), Some("globex"));

    let acme_copy = resources.get(&acme, &key).await.unwrap();
    assert_eq!(acme_copy.data()["title"], "Plans");
    assert!(audit.is_empty());
}
