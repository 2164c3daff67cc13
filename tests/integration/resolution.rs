//! Acting-tenant resolution through the full facade.

use crate::common::{admin_request, claim_request, identity, init_logging, isolation};
use tenant_isolation::config::TenancyConfig;
use tenant_isolation::context::ContextSource;
use tenant_isolation::error::{ErrorKind, TenancyError};
use tenant_isolation::guard::TenantGuard;
use tenant_isolation::identity::{
    AuthenticatedIdentity, ClaimVerifier, Claims, InboundRequest, UpstreamVerified,
};
use tenant_isolation::resolver::REQUEST_ID_HEADER;
use tokio_test::{assert_err, assert_ok};

fn header_config(allow_anonymous: bool) -> TenancyConfig {
    TenancyConfig::builder()
        .enable_header_resolution(allow_anonymous)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_claim_wins_over_disagreeing_header() {
    init_logging();
    let isolation = isolation(header_config(true));
    let request = claim_request("acme").with_header("X-Tenant-ID", "globex");

    let context = assert_ok!(isolation.resolve(&request).await);
    assert_eq!(context.tenant_id(), "acme");
    assert_eq!(context.source(), ContextSource::Claim);
    assert!(!context.is_admin_override());
}

#[tokio::test]
async fn test_unknown_header_tenant_is_rejected() {
    init_logging();
    let isolation = isolation(header_config(true));
    let request = InboundRequest::new().with_header("x-tenant-id", "ghost-tenant");

    let err = assert_err!(isolation.resolve(&request).await);
    assert!(matches!(
        &err,
        TenancyError::UnknownTenant { tenant_id } if tenant_id == "ghost-tenant"
    ));
    assert!(err.is_request_fatal());
}

#[tokio::test]
async fn test_inactive_header_tenant_is_rejected() {
    init_logging();
    let isolation = isolation(header_config(true));
    let request = InboundRequest::new().with_header("X-Tenant-ID", "tenant2");

    let err = assert_err!(isolation.resolve(&request).await);
    assert_eq!(err.kind(), ErrorKind::InactiveTenant);
}

#[tokio::test]
async fn test_anonymous_header_needs_explicit_permission() {
    init_logging();
    let isolation = isolation(header_config(false));

    let anonymous = InboundRequest::new().with_header("X-Tenant-ID", "acme");
    let err = assert_err!(isolation.resolve(&anonymous).await);
    assert_eq!(err.kind(), ErrorKind::Unresolved);

    // An authenticated identity without a tenant claim may still use the header.
    let claims = UpstreamVerified.verify(Claims::new().insert("email", "bob@example.com")).unwrap();
    let authenticated = InboundRequest::new()
        .with_identity(AuthenticatedIdentity::new("bob", claims))
        .with_header("X-Tenant-ID", "acme");
    let context = assert_ok!(isolation.resolve(&authenticated).await);
    assert_eq!(context.source(), ContextSource::Header);
}

#[tokio::test]
async fn test_disallowed_anonymous_header_never_falls_back_to_default() {
    init_logging();
    let config = TenancyConfig::builder()
        .enable_header_resolution(false)
        .enable_subdomain_resolution()
        .default_tenant_id("tenant1")
        .build()
        .unwrap();
    let isolation = isolation(config);

    for tenant in ["ghost-tenant", "acme", "tenant1"] {
        let request = InboundRequest::new()
            .with_host("globex.analytics.example.com")
            .with_header("X-Tenant-ID", tenant);
        let err = assert_err!(isolation.resolve(&request).await);
        assert_eq!(err.kind(), ErrorKind::Unresolved, "header {}", tenant);
    }

    // Without the header the same request still reaches the later sources.
    let plain = InboundRequest::new().with_host("globex.analytics.example.com");
    let context = assert_ok!(isolation.resolve(&plain).await);
    assert_eq!(context.source(), ContextSource::Subdomain);
    let bare = assert_ok!(isolation.resolve(&InboundRequest::new()).await);
    assert_eq!(bare.source(), ContextSource::Default);
}

#[tokio::test]
async fn test_header_ignored_when_disabled() {
    let isolation = isolation(TenancyConfig::default());
    let request = InboundRequest::new().with_header("X-Tenant-ID", "acme");
    assert_eq!(
        isolation.resolve(&request).await.unwrap_err().kind(),
        ErrorKind::Unresolved
    );
}

#[tokio::test]
async fn test_subdomain_then_default() {
    init_logging();
    let config = TenancyConfig::builder()
        .enable_subdomain_resolution()
        .default_tenant_id("tenant1")
        .build()
        .unwrap();
    let isolation = isolation(config);

    let context = isolation
        .resolve(&InboundRequest::new().with_host("Globex.analytics.example.com:8088"))
        .await
        .unwrap();
    assert_eq!(context.tenant_id(), "globex");
    assert_eq!(context.source(), ContextSource::Subdomain);

    for host in ["www.analytics.example.com", "example.com", "10.0.0.7"] {
        let context = isolation
            .resolve(&InboundRequest::new().with_host(host))
            .await
            .unwrap();
        assert_eq!(context.tenant_id(), "tenant1", "host {}", host);
        assert_eq!(context.source(), ContextSource::Default);
    }
}

#[tokio::test]
async fn test_nothing_to_resolve_fails_closed() {
    let isolation = isolation(TenancyConfig::default());
    let err = isolation.resolve(&InboundRequest::new()).await.unwrap_err();
    assert!(matches!(err, TenancyError::Unresolved));
    assert_eq!(err.kind().as_str(), "UNRESOLVED");
}

#[tokio::test]
async fn test_admin_override_requires_bypass() {
    let bypass = TenancyConfig::builder().admin_bypass_enabled(true).build().unwrap();

    let with_bypass = isolation(bypass).resolve(&admin_request("acme")).await.unwrap();
    assert!(with_bypass.is_admin_override());
    assert_eq!(with_bypass.tenant_id(), "acme");

    let without = isolation(TenancyConfig::default())
        .resolve(&admin_request("acme"))
        .await
        .unwrap();
    assert!(!without.is_admin_override());

    let plain = isolation(
        TenancyConfig::builder().admin_bypass_enabled(true).build().unwrap(),
    )
    .resolve(&claim_request("acme"))
    .await
    .unwrap();
    assert!(!plain.is_admin_override());
}

#[tokio::test]
async fn test_fallback_claim_fields() {
    let config = TenancyConfig::builder()
        .add_fallback_claim_field("org_id")
        .build()
        .unwrap();
    let isolation = isolation(config);
    let claims = UpstreamVerified.verify(Claims::new().insert("org_id", "globex")).unwrap();
    let request = InboundRequest::new().with_identity(AuthenticatedIdentity::new("carol", claims));

    assert_eq!(isolation.resolve(&request).await.unwrap().tenant_id(), "globex");
}

#[tokio::test]
async fn test_scope_carries_request_id_and_fingerprint() {
    let isolation = isolation(TenancyConfig::default());
    let request = InboundRequest::new()
        .with_identity(identity("alice@example.com", "acme"))
        .with_header(REQUEST_ID_HEADER, "req-42");

    let scope = isolation.resolve_scope(&request).await.unwrap();
    assert_eq!(scope.request_id(), "req-42");
    assert_eq!(scope.tenant_id(), "acme");
    let fingerprint = scope.actor_fingerprint().unwrap();
    assert_eq!(fingerprint.len(), 64);
    assert!(!fingerprint.contains("alice"));

    let generated = isolation.resolve_scope(&claim_request("acme")).await.unwrap();
    assert_ne!(generated.request_id(), "req-42");
    assert!(!generated.request_id().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_resolve_independently() {
    let isolation = isolation(TenancyConfig::default());
    let tenants = ["acme", "globex", "tenant1", "acme", "globex", "tenant1"];
    let requests: Vec<_> = tenants.iter().map(|t| claim_request(t)).collect();

    let contexts = futures::future::join_all(requests.iter().map(|r| isolation.resolve(r))).await;
    for (tenant, context) in tenants.iter().zip(contexts) {
        assert_eq!(context.unwrap().tenant_id(), *tenant);
    }
}

#[test]
fn test_config_validation_rejects_ambiguous_header_policy() {
    let err = TenancyConfig::from_json_str(r#"{"enableHeaderResolution": true}"#).unwrap_err();
    assert!(err.to_string().contains("allowAnonymousHeaderResolution"));

    let config = TenancyConfig::from_json_str(
        r#"{"enableHeaderResolution": true, "allowAnonymousHeaderResolution": false}"#,
    )
    .unwrap();
    assert!(!config.header_allowed_without_identity());

    assert!(TenancyConfig::from_json_str(r#"{"defaultTenantId": "has space"}"#).is_err());
    assert!(
        TenancyConfig::from_json_str(
            r#"{"registryRefreshIntervalSecs": 60, "registryMaxStalenessSecs": 30}"#
        )
        .is_err()
    );
}
