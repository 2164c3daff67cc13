//! Tenant identifiers and per-request tenant context.
//!
//! A [`TenantContext`] is produced once per request by the resolver and then
//! passed explicitly to every data-access call. There is no process-wide
//! "current tenant": whatever scope a call runs in is the one it was handed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Minimum length of a tenant identifier.
pub const TENANT_ID_MIN_LEN: usize = 2;
/// Maximum length of a tenant identifier.
pub const TENANT_ID_MAX_LEN: usize = 50;

/// A syntactically valid tenant identifier.
///
/// Identifiers are 2 to 50 ASCII characters drawn from alphanumerics, `-` and
/// `_`. Validation here is purely syntactic; whether the tenant exists is the
/// registry's call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Parse and validate a tenant identifier.
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidTenantId> {
        let value = value.into();
        if value.len() < TENANT_ID_MIN_LEN || value.len() > TENANT_ID_MAX_LEN {
            return Err(InvalidTenantId {
                value,
                reason: "length must be between 2 and 50 characters",
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(InvalidTenantId {
                value,
                reason: "only ASCII letters, digits, '-' and '_' are allowed",
            });
        }
        Ok(Self(value))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = InvalidTenantId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for TenantId {
    type Error = InvalidTenantId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl PartialEq<str> for TenantId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TenantId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Rejected tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid tenant identifier '{value}': {reason}")]
pub struct InvalidTenantId {
    pub value: String,
    pub reason: &'static str,
}

/// Where the acting tenant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    /// Verified identity claim
    Claim,
    /// Request header
    Header,
    /// First label of the request host
    Subdomain,
    /// Configured default tenant
    Default,
}

impl ContextSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextSource::Claim => "claim",
            ContextSource::Header => "header",
            ContextSource::Subdomain => "subdomain",
            ContextSource::Default => "default",
        }
    }
}

impl fmt::Display for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved tenant for one request.
///
/// Immutable once built. The only way around tenant filtering is
/// `is_admin_override`, which the resolver sets explicitly; it is never
/// inferred from the tenant id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    tenant_id: TenantId,
    is_admin_override: bool,
    source: ContextSource,
}

impl TenantContext {
    /// Create a context scoped to a single tenant.
    pub fn new(tenant_id: TenantId, source: ContextSource) -> Self {
        Self {
            tenant_id,
            is_admin_override: false,
            source,
        }
    }

    /// Create a context whose holder bypasses tenant filtering.
    pub fn with_admin_override(tenant_id: TenantId, source: ContextSource) -> Self {
        Self {
            tenant_id,
            is_admin_override: true,
            source,
        }
    }

    pub fn tenant_id(&self) -> &str {
        self.tenant_id.as_str()
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn is_admin_override(&self) -> bool {
        self.is_admin_override
    }

    pub fn source(&self) -> ContextSource {
        self.source
    }
}

/// Request-scoped holder for the resolved context.
///
/// Created when resolution succeeds and dropped when the request ends. It
/// carries a request id and an optional actor fingerprint so that audit events
/// can be correlated without logging raw subjects.
#[derive(Debug, Clone)]
pub struct RequestScope {
    request_id: String,
    context: TenantContext,
    actor_fingerprint: Option<String>,
}

impl RequestScope {
    /// Create a scope with a generated request id.
    pub fn new(context: TenantContext) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            context,
            actor_fingerprint: None,
        }
    }

    /// Create a scope with a caller-provided request id.
    pub fn with_request_id(request_id: impl Into<String>, context: TenantContext) -> Self {
        Self {
            request_id: request_id.into(),
            context,
            actor_fingerprint: None,
        }
    }

    /// Attach the acting subject; only its SHA-256 fingerprint is retained.
    pub fn with_actor(mut self, subject: &str) -> Self {
        self.actor_fingerprint = Some(fingerprint(subject));
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn tenant_id(&self) -> &str {
        self.context.tenant_id()
    }

    pub fn actor_fingerprint(&self) -> Option<&str> {
        self.actor_fingerprint.as_deref()
    }
}

/// Hex-encoded SHA-256 of a subject identifier.
pub(crate) fn fingerprint(subject: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    format!("{:x}", hasher.finalize())
}
