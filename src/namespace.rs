//! Namespacing of shared infrastructure by tenant.
//!
//! Everything here is a pure function of the tenant identifier except
//! [`connection_route`], which reads the storage namespace from the registry.
//!
//! # Cache keys
//!
//! ```rust
//! use tenant_isolation::context::TenantId;
//! use tenant_isolation::namespace::{cache_key, owns_cache_key};
//!
//! let acme = TenantId::parse("acme").unwrap();
//! let key = cache_key("dashboard:42", &acme);
//! assert_eq!(key, "acme:dashboard:42");
//! assert!(owns_cache_key(&key, &acme));
//! ```
//!
//! # Row filters
//!
//! ```rust
//! use tenant_isolation::namespace::filter_clause;
//!
//! let clause = filter_clause("acme", false, None).to_sql("tenant_id", 1);
//! assert_eq!(clause.sql(), "tenant_id = $1");
//! assert_eq!(clause.params(), ["acme".to_string()]);
//!
//! // The default tenant also owns rows that predate tenancy.
//! let owner = filter_clause("acme", false, Some("acme")).to_sql("tenant_id", 1);
//! assert_eq!(owner.sql(), "(tenant_id = $1 OR tenant_id IS NULL)");
//!
//! assert!(filter_clause("acme", true, None).is_tautology());
//! ```

use crate::context::{TenantContext, TenantId};
use crate::enforcer::TenantScoped;
use crate::error::{TenancyError, TenancyResult};
use crate::registry::TenantRegistry;
use url::Url;

/// Separator between the tenant id and the base cache key.
pub const CACHE_KEY_SEPARATOR: char = ':';

/// Column holding the owning tenant on every tenant-scoped table.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Longest identifier PostgreSQL accepts without truncation.
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Schema every tenant search path falls back to.
pub const SHARED_SCHEMA: &str = "public";

const TAUTOLOGY_SQL: &str = "1 = 1";

/// Prefix `base_key` with the tenant so entries never collide across tenants.
pub fn cache_key(base_key: &str, tenant_id: &TenantId) -> String {
    let mut key = cache_key_prefix(tenant_id);
    key.push_str(base_key);
    key
}

/// The prefix shared by every cache key of one tenant.
pub fn cache_key_prefix(tenant_id: &TenantId) -> String {
    format!("{}{}", tenant_id, CACHE_KEY_SEPARATOR)
}

/// Whether `key` was produced by [`cache_key`] for `tenant_id`.
pub fn owns_cache_key(key: &str, tenant_id: &TenantId) -> bool {
    key.strip_prefix(tenant_id.as_str())
        .is_some_and(|rest| rest.starts_with(CACHE_KEY_SEPARATOR))
}

/// Whether `namespace` is usable as a schema name without quoting tricks.
pub fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    namespace.len() <= MAX_NAMESPACE_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Namespace assigned to a tenant when none is given explicitly.
///
/// Lower-cases the id and maps `-` to `_`; ids starting with a digit get a
/// `tenant_` prefix.
pub fn default_namespace(tenant_id: &TenantId) -> String {
    let normalized: String = tenant_id
        .as_str()
        .chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect();
    if normalized.starts_with(|c: char| c.is_ascii_digit()) {
        format!("tenant_{}", normalized)
    } else {
        normalized
    }
}

/// Where a tenant's persisted state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRoute {
    tenant_id: TenantId,
    namespace: String,
}

impl ConnectionRoute {
    pub(crate) fn new(tenant_id: TenantId, namespace: String) -> Self {
        Self {
            tenant_id,
            namespace,
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Pin a database URI to the tenant's schema.
    ///
    /// PostgreSQL URIs get `options=-c search_path=<namespace>,public`,
    /// replacing any `options` already present. Other schemes come back
    /// unchanged.
    pub fn apply_to_uri(&self, base_uri: &str) -> Result<String, url::ParseError> {
        let mut url = Url::parse(base_uri)?;
        if !is_postgres_scheme(url.scheme()) {
            return Ok(base_uri.to_string());
        }

        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| *name != "options")
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (name, value) in &retained {
                pairs.append_pair(name, value);
            }
            pairs.append_pair(
                "options",
                &format!("-c search_path={},{}", self.namespace, SHARED_SCHEMA),
            );
        }

        Ok(url.to_string())
    }

    /// Statement that switches an open session to the tenant's schema.
    pub fn search_path_statement(&self) -> String {
        format!(
            "SET search_path TO \"{}\", {}",
            self.namespace, SHARED_SCHEMA
        )
    }
}

fn is_postgres_scheme(scheme: &str) -> bool {
    scheme == "postgres" || scheme == "postgresql" || scheme.starts_with("postgresql+")
}

/// Resolve the storage namespace for `tenant_id` from the registry.
///
/// There is no fallback partition: an unregistered tenant is `UnknownTenant`
/// and a deactivated one is `InactiveTenant`.
pub async fn connection_route<R>(registry: &R, tenant_id: &str) -> TenancyResult<ConnectionRoute>
where
    R: TenantRegistry,
{
    let entry = registry
        .lookup(tenant_id)
        .await?
        .ok_or_else(|| TenancyError::unknown_tenant(tenant_id))?;

    if !entry.is_active() {
        return Err(TenancyError::inactive_tenant(tenant_id));
    }

    if !is_valid_namespace(entry.storage_namespace()) {
        log::warn!(
            "Refusing route for tenant {}: invalid storage namespace '{}'",
            tenant_id,
            entry.storage_namespace()
        );
        return Err(TenancyError::registry_unavailable(format!(
            "tenant {} has no usable storage namespace",
            tenant_id
        )));
    }

    Ok(ConnectionRoute::new(
        entry.tenant_id().clone(),
        entry.storage_namespace().to_string(),
    ))
}

/// Row-level tenant restriction, evaluated in memory or rendered to SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantPredicate {
    /// Admin override: every row qualifies
    Unrestricted,
    /// Rows owned by `tenant_id`; tenant-less legacy rows too when `include_legacy`
    OwnedBy {
        tenant_id: String,
        include_legacy: bool,
    },
}

impl TenantPredicate {
    /// Predicate for `context`, where `legacy_owner` is the tenant that owns
    /// rows without a tenant column value.
    pub fn for_context(context: &TenantContext, legacy_owner: Option<&str>) -> Self {
        Self::for_tenant(context.tenant_id(), context.is_admin_override(), legacy_owner)
    }

    /// Predicate for `tenant_id`; legacy rows qualify only when `legacy_owner`
    /// is that same tenant.
    pub fn for_tenant(tenant_id: &str, is_admin_override: bool, legacy_owner: Option<&str>) -> Self {
        if is_admin_override {
            return TenantPredicate::Unrestricted;
        }
        TenantPredicate::OwnedBy {
            tenant_id: tenant_id.to_string(),
            include_legacy: legacy_owner == Some(tenant_id),
        }
    }

    pub fn is_tautology(&self) -> bool {
        matches!(self, TenantPredicate::Unrestricted)
    }

    /// Evaluate against a resource owner; `None` is a legacy row.
    pub fn matches_owner(&self, owner: Option<&str>) -> bool {
        match self {
            TenantPredicate::Unrestricted => true,
            TenantPredicate::OwnedBy {
                tenant_id,
                include_legacy,
            } => match owner {
                Some(owner) => owner == tenant_id,
                None => *include_legacy,
            },
        }
    }

    pub fn matches<R>(&self, resource: &R) -> bool
    where
        R: TenantScoped + ?Sized,
    {
        self.matches_owner(resource.owner_tenant_id())
    }

    /// Render as a parameterised clause over `column`, numbering placeholders
    /// from `first_param`.
    ///
    /// `column` is interpolated verbatim and must come from code, never input.
    pub fn to_sql(&self, column: &str, first_param: usize) -> SqlFragment {
        debug_assert!(
            column
                .split('.')
                .all(|part| !part.is_empty()
                    && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')),
            "column must be a plain identifier"
        );
        match self {
            TenantPredicate::Unrestricted => SqlFragment::tautology(first_param),
            TenantPredicate::OwnedBy {
                tenant_id,
                include_legacy: false,
            } => SqlFragment {
                sql: format!("{} = ${}", column, first_param),
                params: vec![tenant_id.clone()],
                first_param,
            },
            TenantPredicate::OwnedBy {
                tenant_id,
                include_legacy: true,
            } => SqlFragment {
                sql: format!("({} = ${} OR {} IS NULL)", column, first_param, column),
                params: vec![tenant_id.clone()],
                first_param,
            },
        }
    }
}

/// Predicate restricting rows to `tenant_id`; a tautology for admin override.
///
/// `legacy_owner` is the tenant owning rows without a tenant value, normally
/// the configured default tenant. This is the same predicate
/// [`AccessEnforcer`](crate::enforcer::AccessEnforcer) evaluates in memory.
pub fn filter_clause(
    tenant_id: &str,
    is_admin_override: bool,
    legacy_owner: Option<&str>,
) -> TenantPredicate {
    TenantPredicate::for_tenant(tenant_id, is_admin_override, legacy_owner)
}

/// A SQL condition with `$n` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    sql: String,
    params: Vec<String>,
    first_param: usize,
}

impl SqlFragment {
    /// A host-written condition whose placeholders start at `$1`.
    pub fn new(sql: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            params,
            first_param: 1,
        }
    }

    fn tautology(first_param: usize) -> Self {
        Self {
            sql: TAUTOLOGY_SQL.to_string(),
            params: Vec::new(),
            first_param,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Placeholder number the next bound value would take.
    pub fn next_param(&self) -> usize {
        self.first_param + self.params.len()
    }

    pub fn is_tautology(&self) -> bool {
        self.params.is_empty() && self.sql == TAUTOLOGY_SQL
    }

    /// Conjunction of two fragments; `other`'s placeholders are renumbered to
    /// follow this fragment's.
    pub fn and(self, other: SqlFragment) -> SqlFragment {
        if other.is_tautology() {
            return self;
        }
        let shift = self.next_param() as i64 - other.first_param as i64;
        let other_sql = shift_placeholders(&other.sql, shift);
        if self.is_tautology() {
            return SqlFragment {
                sql: other_sql,
                params: other.params,
                first_param: self.first_param,
            };
        }

        let mut params = self.params;
        params.extend(other.params);
        SqlFragment {
            sql: format!("{} AND {}", self.sql, other_sql),
            params,
            first_param: self.first_param,
        }
    }

    pub fn into_parts(self) -> (String, Vec<String>) {
        (self.sql, self.params)
    }
}

fn shift_placeholders(sql: &str, shift: i64) -> String {
    if shift == 0 {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 4);
    let mut chars = sql.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        out.push(c);
        if c != '$' {
            continue;
        }
        let mut digits = String::new();
        while let Some(&(_, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        match digits.parse::<i64>().ok().and_then(|n| n.checked_add(shift)) {
            Some(n) => out.push_str(&n.to_string()),
            None => out.push_str(&digits),
        }
    }
    out
}
