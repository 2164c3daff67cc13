//! Cache keys, connection routes, row filters and the tenant migration.

use crate::common::{admin_context, context, isolation, standard_registry, tenant};
use serde_json::json;
use std::collections::HashSet;
use tenant_isolation::config::TenancyConfig;
use tenant_isolation::error::ErrorKind;
use tenant_isolation::migration::{SchemaObject, TenantMigration};
use tenant_isolation::namespace::{
    SqlFragment, TENANT_COLUMN, cache_key, connection_route, filter_clause,
};
use tenant_isolation::storage::TenantCache;
use url::Url;

#[test]
fn test_cache_keys_never_collide_across_tenants() {
    let base_keys = ["dashboard:1", "chart:1", "", "a:b:c"];
    let tenants = ["acme", "globex", "tenant1", "acme-2"];

    let mut seen = HashSet::new();
    for tenant_id in tenants {
        for base in base_keys {
            let key = cache_key(base, &tenant(tenant_id));
            assert_eq!(key, cache_key(base, &tenant(tenant_id)));
            assert!(seen.insert(key), "duplicate key for {} / {}", tenant_id, base);
        }
    }
    assert_eq!(cache_key("dashboard:1", &tenant("acme")), "acme:dashboard:1");
}

#[tokio::test]
async fn test_tenant_cache_isolates_and_evicts() {
    let cache = TenantCache::new();
    cache.set(&context("acme"), "dashboard:1", json!({"rows": 10}), None).await;
    cache.set(&context("globex"), "dashboard:1", json!({"rows": 99}), None).await;

    assert_eq!(
        cache.get(&context("acme"), "dashboard:1").await,
        Some(json!({"rows": 10}))
    );
    assert_eq!(cache.clear_tenant(&tenant("globex")).await, 1);
    assert!(cache.get(&context("globex"), "dashboard:1").await.is_none());
    assert!(cache.get(&context("acme"), "dashboard:1").await.is_some());
}

#[tokio::test]
async fn test_connection_routes_come_from_registry() {
    let registry = standard_registry();

    let acme = connection_route(&registry, "acme").await.unwrap();
    assert_eq!(acme.namespace(), "acme_data");
    assert_eq!(acme.tenant_id().as_str(), "acme");
    assert_eq!(
        acme.search_path_statement(),
        "SET search_path TO \"acme_data\", public"
    );

    let globex = connection_route(&registry, "globex").await.unwrap();
    assert_eq!(globex.namespace(), "globex");

    let unknown = connection_route(&registry, "ghost-tenant").await.unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::UnknownTenant);
    let inactive = connection_route(&registry, "tenant2").await.unwrap_err();
    assert_eq!(inactive.kind(), ErrorKind::InactiveTenant);
}

#[tokio::test]
async fn test_route_pins_postgres_uri_to_schema() {
    let isolation = isolation(TenancyConfig::default());
    let route = isolation.connection_route(&context("acme")).await.unwrap();

    let pinned = route
        .apply_to_uri("postgresql://analyst:secret@db:5432/analytics?sslmode=require&options=-c%20statement_timeout%3D5s")
        .unwrap();
    let parsed = Url::parse(&pinned).unwrap();
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("sslmode".to_string(), "require".to_string()),
            ("options".to_string(), "-c search_path=acme_data,public".to_string()),
        ]
    );
    assert_eq!(parsed.host_str(), Some("db"));

    let sqlite = "sqlite:///var/lib/analytics.db";
    assert_eq!(route.apply_to_uri(sqlite).unwrap(), sqlite);
    assert!(route.apply_to_uri("not a uri").is_err());
}

#[test]
fn test_filter_clause_renders_sql() {
    let own = filter_clause("acme", false, None);
    let fragment = own.to_sql(TENANT_COLUMN, 1);
    assert_eq!(fragment.sql(), "tenant_id = $1");
    assert_eq!(fragment.params(), ["acme"]);

    let admin = filter_clause("acme", true, None);
    assert!(admin.is_tautology());
    assert!(admin.to_sql(TENANT_COLUMN, 1).is_tautology());
}

#[test]
fn test_predicate_composes_with_host_conditions() {
    let host = SqlFragment::new("published = $1 AND owner_id = $2", vec!["true".into(), "7".into()]);
    let combined = host.and(filter_clause("acme", false, None).to_sql("slices.tenant_id", 1));

    let (sql, params) = combined.into_parts();
    assert_eq!(sql, "published = $1 AND owner_id = $2 AND slices.tenant_id = $3");
    assert_eq!(params, vec!["true", "7", "acme"]);

    let unrestricted = SqlFragment::new("published = $1", vec!["true".into()])
        .and(filter_clause("acme", true, None).to_sql(TENANT_COLUMN, 1));
    assert_eq!(unrestricted.sql(), "published = $1");
}

#[test]
fn test_enforcer_predicate_includes_legacy_rows_for_default_tenant() {
    let config = TenancyConfig::builder().default_tenant_id("tenant1").build().unwrap();
    let isolation = isolation(config);

    let owner = isolation.filter_clause(&context("tenant1"));
    assert_eq!(
        owner.to_sql(TENANT_COLUMN, 4).sql(),
        "(tenant_id = $4 OR tenant_id IS NULL)"
    );
    assert!(owner.matches_owner(None));

    let other = isolation.filter_clause(&context("acme"));
    assert!(!other.matches_owner(None));
    assert!(isolation.filter_clause(&admin_context("acme")).is_tautology());
}

#[test]
fn test_migration_down_undoes_up() {
    let migration = TenantMigration::new().with_user_table("ab_user");
    let up = migration.up();
    let down = migration.down();

    let created: Vec<&SchemaObject> = up.iter().map(|s| &s.object).collect();
    let mut dropped: Vec<&SchemaObject> = down.iter().map(|s| &s.object).collect();
    dropped.reverse();
    assert_eq!(created, dropped);

    let tables = up.iter().filter(|s| matches!(s.object, SchemaObject::Table(_))).count();
    let columns = up.iter().filter(|s| matches!(s.object, SchemaObject::Column { .. })).count();
    let indexes = up.iter().filter(|s| matches!(s.object, SchemaObject::Index { .. })).count();
    assert_eq!((tables, columns, indexes), (1, 5, 7));

    // Every index is dropped before the table or column it covers.
    let position = |object: &SchemaObject| down.iter().position(|s| &s.object == object).unwrap();
    for step in &down {
        if let SchemaObject::Index { table, .. } = &step.object {
            let covering = up
                .iter()
                .find(|s| match &s.object {
                    SchemaObject::Table(name) => name == table,
                    SchemaObject::Column { table: t, .. } => t == table,
                    SchemaObject::Index { .. } => false,
                })
                .unwrap();
            assert!(position(&step.object) < position(&covering.object));
        }
    }
}
