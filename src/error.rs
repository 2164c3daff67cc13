//! Error types for tenant isolation.
//!
//! Every failure in this crate fails closed: resolution and registry problems
//! surface as authorization failures at the request boundary, and enforcement
//! denials abort the single operation that triggered them.

use crate::enforcer::ResourceKind;

/// Classification of tenancy failures.
///
/// Hosts typically map every kind to an authorization failure; the kind is
/// kept so that logs and metrics can tell the cases apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No source yielded a tenant candidate
    Unresolved,
    /// The candidate has no registry entry
    UnknownTenant,
    /// The candidate is registered but deactivated
    InactiveTenant,
    /// The acting tenant does not own the targeted resource
    CrossTenantAccess,
    /// The registry backing store cannot be reached and no usable snapshot exists
    RegistryUnavailable,
}

impl ErrorKind {
    /// Stable string form used in logs and audit records.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unresolved => "UNRESOLVED",
            ErrorKind::UnknownTenant => "UNKNOWN_TENANT",
            ErrorKind::InactiveTenant => "INACTIVE_TENANT",
            ErrorKind::CrossTenantAccess => "CROSS_TENANT_ACCESS",
            ErrorKind::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for tenant resolution, registry access and enforcement.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    /// No claim, header, subdomain or default produced a candidate
    #[error("Unable to resolve a tenant for the request")]
    Unresolved,

    /// Candidate tenant is not registered (or is not a well-formed identifier)
    #[error("Unknown tenant: {tenant_id}")]
    UnknownTenant { tenant_id: String },

    /// Candidate tenant exists but is deactivated
    #[error("Tenant is inactive: {tenant_id}")]
    InactiveTenant { tenant_id: String },

    /// The acting tenant attempted to touch another tenant's resource
    #[error("Access denied: {resource_kind} {resource_id} not accessible to tenant {tenant_id}")]
    CrossTenantAccess {
        tenant_id: String,
        resource_kind: ResourceKind,
        resource_id: String,
    },

    /// Registry backing store unreachable and no snapshot within its staleness bound
    #[error("Tenant registry unavailable: {message}")]
    RegistryUnavailable { message: String },
}

impl TenancyError {
    /// The taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TenancyError::Unresolved => ErrorKind::Unresolved,
            TenancyError::UnknownTenant { .. } => ErrorKind::UnknownTenant,
            TenancyError::InactiveTenant { .. } => ErrorKind::InactiveTenant,
            TenancyError::CrossTenantAccess { .. } => ErrorKind::CrossTenantAccess,
            TenancyError::RegistryUnavailable { .. } => ErrorKind::RegistryUnavailable,
        }
    }

    /// Whether the host should reject the whole request rather than a single operation.
    ///
    /// Cross-tenant denials only abort the offending operation; everything else
    /// means the request never had a usable tenant.
    pub fn is_request_fatal(&self) -> bool {
        !matches!(self, TenancyError::CrossTenantAccess { .. })
    }

    /// Create an unknown tenant error
    pub fn unknown_tenant(tenant_id: impl Into<String>) -> Self {
        Self::UnknownTenant {
            tenant_id: tenant_id.into(),
        }
    }

    /// Create an inactive tenant error
    pub fn inactive_tenant(tenant_id: impl Into<String>) -> Self {
        Self::InactiveTenant {
            tenant_id: tenant_id.into(),
        }
    }

    /// Create a cross-tenant access error
    pub fn cross_tenant_access(
        tenant_id: impl Into<String>,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
    ) -> Self {
        Self::CrossTenantAccess {
            tenant_id: tenant_id.into(),
            resource_kind,
            resource_id: resource_id.into(),
        }
    }

    /// Create a registry unavailable error
    pub fn registry_unavailable(message: impl Into<String>) -> Self {
        Self::RegistryUnavailable {
            message: message.into(),
        }
    }
}

/// Errors raised while building or validating configuration.
///
/// These are deployment mistakes and should surface at startup, never per request.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    /// Configuration file could not be read
    #[error("Failed to read configuration from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigurationError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// Errors raised by a registry backing store.
#[derive(Debug, thiserror::Error)]
pub enum RegistryStoreError {
    /// The store could not be reached
    #[error("Registry store unavailable: {message}")]
    Unavailable { message: String },

    /// A stored row violated the registry invariants
    #[error("Invalid registry entry '{tenant_id}': {message}")]
    InvalidEntry { tenant_id: String, message: String },

    /// Attempted to change an assigned storage namespace in place
    #[error(
        "Storage namespace for tenant '{tenant_id}' is '{current}' and cannot change to '{requested}' without a migration"
    )]
    NamespaceChange {
        tenant_id: String,
        current: String,
        requested: String,
    },
}

impl RegistryStoreError {
    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an invalid entry error
    pub fn invalid_entry(tenant_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            tenant_id: tenant_id.into(),
            message: message.into(),
        }
    }
}

// Result type aliases for convenience
pub type TenancyResult<T> = Result<T, TenancyError>;
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
pub type RegistryStoreResult<T> = Result<T, RegistryStoreError>;
