//! Resource catalogues shared by enforcement and namespacing tests.

use tenant_isolation::enforcer::{ResourceKind, ResourceRef};

/// Dashboards and charts spread over `tenant1`, `acme`, `globex` and one legacy row.
pub fn mixed_catalogue() -> Vec<ResourceRef> {
    vec![
        ResourceRef::new(ResourceKind::Dashboard, "d1", "tenant1"),
        ResourceRef::new(ResourceKind::Dashboard, "d2", "acme"),
        ResourceRef::new(ResourceKind::Chart, "c1", "acme"),
        ResourceRef::legacy(ResourceKind::Chart, "c-legacy"),
        ResourceRef::new(ResourceKind::Chart, "c2", "globex"),
        ResourceRef::new(ResourceKind::SavedQuery, "q1", "tenant1"),
        ResourceRef::new(ResourceKind::Connection, "db1", "acme"),
    ]
}

pub fn ids<'a, I>(resources: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ResourceRef>,
{
    resources.into_iter().map(|r| r.id.clone()).collect()
}
