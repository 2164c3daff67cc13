//! Configuration for tenant resolution and enforcement.
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::config::TenancyConfig;
//!
//! let config = TenancyConfig::builder()
//!     .enable_header_resolution(false)
//!     .enable_subdomain_resolution()
//!     .default_tenant_id("public")
//!     .admin_bypass_enabled(true)
//!     .build()?;
//!
//! assert_eq!(config.tenant_header_name, "X-Tenant-ID");
//! # Ok::<(), tenant_isolation::error::ConfigurationError>(())
//! ```
//!
//! The same configuration can be loaded from JSON with camelCase keys:
//!
//! ```rust
//! use tenant_isolation::config::TenancyConfig;
//!
//! let config = TenancyConfig::from_json_str(r#"{
//!     "enableHeaderResolution": true,
//!     "allowAnonymousHeaderResolution": false,
//!     "defaultTenantId": "public"
//! }"#)?;
//! assert!(config.enable_header_resolution);
//! # Ok::<(), tenant_isolation::error::ConfigurationError>(())
//! ```

use crate::context::TenantId;
use crate::error::{ConfigurationError, ConfigurationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TENANT_CLAIM_FIELD: &str = "tenant_id";
pub const DEFAULT_TENANT_HEADER_NAME: &str = "X-Tenant-ID";
pub const DEFAULT_REGISTRY_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REGISTRY_MAX_STALENESS_SECS: u64 = 300;

/// Host labels that are never treated as tenant identifiers.
pub const DEFAULT_RESERVED_SUBDOMAINS: [&str; 5] = ["www", "api", "admin", "static", "cdn"];

/// Recognised tenancy options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenancyConfig {
    /// Identity claim carrying the tenant id
    pub tenant_claim_field: String,
    /// Claims consulted, in order, when the primary claim is absent
    pub fallback_claim_fields: Vec<String>,
    /// Header carrying the tenant id
    pub tenant_header_name: String,
    /// Whether the header is consulted at all
    pub enable_header_resolution: bool,
    /// Whether the header may select a tenant for requests without an identity.
    ///
    /// Must be set explicitly whenever header resolution is enabled.
    pub allow_anonymous_header_resolution: Option<bool>,
    /// Whether the first host label is consulted
    pub enable_subdomain_resolution: bool,
    /// Host labels ignored by subdomain resolution
    pub reserved_subdomains: Vec<String>,
    /// Tenant used when nothing else matches, and owner of legacy resources
    pub default_tenant_id: Option<String>,
    /// Whether administrator identities bypass tenant filtering
    pub admin_bypass_enabled: bool,
    /// Background registry refresh period
    pub registry_refresh_interval_secs: u64,
    /// How long a registry snapshot may be served while the store is unreachable
    pub registry_max_staleness_secs: u64,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            tenant_claim_field: DEFAULT_TENANT_CLAIM_FIELD.to_string(),
            fallback_claim_fields: Vec::new(),
            tenant_header_name: DEFAULT_TENANT_HEADER_NAME.to_string(),
            enable_header_resolution: false,
            allow_anonymous_header_resolution: None,
            enable_subdomain_resolution: false,
            reserved_subdomains: DEFAULT_RESERVED_SUBDOMAINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_tenant_id: None,
            admin_bypass_enabled: false,
            registry_refresh_interval_secs: DEFAULT_REGISTRY_REFRESH_INTERVAL_SECS,
            registry_max_staleness_secs: DEFAULT_REGISTRY_MAX_STALENESS_SECS,
        }
    }
}

impl TenancyConfig {
    /// Create a new builder starting from defaults.
    pub fn builder() -> TenancyConfigBuilder {
        TenancyConfigBuilder::new()
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> ConfigurationResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigurationResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> ConfigurationResult<()> {
        if self.tenant_claim_field.trim().is_empty() {
            return Err(ConfigurationError::validation(
                "tenantClaimField must not be empty",
            ));
        }

        if self.fallback_claim_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigurationError::validation(
                "fallbackClaimFields must not contain empty names",
            ));
        }

        if self.enable_header_resolution {
            if self.tenant_header_name.trim().is_empty() {
                return Err(ConfigurationError::validation(
                    "tenantHeaderName must not be empty when header resolution is enabled",
                ));
            }
            if self.allow_anonymous_header_resolution.is_none() {
                return Err(ConfigurationError::validation(
                    "allowAnonymousHeaderResolution must be set explicitly when header resolution is enabled",
                ));
            }
        }

        if let Some(default_tenant) = &self.default_tenant_id {
            TenantId::parse(default_tenant.as_str()).map_err(|e| {
                ConfigurationError::validation(format!("defaultTenantId is invalid: {}", e))
            })?;
        }

        if self.registry_refresh_interval_secs == 0 {
            return Err(ConfigurationError::validation(
                "registryRefreshIntervalSecs must be greater than 0",
            ));
        }

        if self.registry_max_staleness_secs < self.registry_refresh_interval_secs {
            return Err(ConfigurationError::validation(
                "registryMaxStalenessSecs must be at least registryRefreshIntervalSecs",
            ));
        }

        Ok(())
    }

    /// The default tenant as a parsed identifier.
    ///
    /// Returns `None` when unset or malformed; `validate` rejects the latter.
    pub fn default_tenant(&self) -> Option<TenantId> {
        self.default_tenant_id
            .as_deref()
            .and_then(|id| TenantId::parse(id).ok())
    }

    /// Whether headers may select a tenant for a request with no identity.
    pub fn header_allowed_without_identity(&self) -> bool {
        self.allow_anonymous_header_resolution.unwrap_or(false)
    }

    /// Whether `label` is excluded from subdomain resolution.
    pub fn is_reserved_subdomain(&self, label: &str) -> bool {
        self.reserved_subdomains
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(label))
    }

    pub fn registry_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.registry_refresh_interval_secs)
    }

    pub fn registry_max_staleness(&self) -> Duration {
        Duration::from_secs(self.registry_max_staleness_secs)
    }
}

/// Builder for [`TenancyConfig`].
#[derive(Debug, Clone, Default)]
pub struct TenancyConfigBuilder {
    config: TenancyConfig,
}

impl TenancyConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant_claim_field(mut self, field: impl Into<String>) -> Self {
        self.config.tenant_claim_field = field.into();
        self
    }

    pub fn add_fallback_claim_field(mut self, field: impl Into<String>) -> Self {
        self.config.fallback_claim_fields.push(field.into());
        self
    }

    pub fn tenant_header_name(mut self, name: impl Into<String>) -> Self {
        self.config.tenant_header_name = name.into();
        self
    }

    /// Enable header resolution.
    ///
    /// `allow_anonymous` decides whether a request without an authenticated
    /// identity may pick its tenant by header. There is no default for this.
    pub fn enable_header_resolution(mut self, allow_anonymous: bool) -> Self {
        self.config.enable_header_resolution = true;
        self.config.allow_anonymous_header_resolution = Some(allow_anonymous);
        self
    }

    pub fn enable_subdomain_resolution(mut self) -> Self {
        self.config.enable_subdomain_resolution = true;
        self
    }

    pub fn reserved_subdomains<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.reserved_subdomains = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.config.default_tenant_id = Some(tenant_id.into());
        self
    }

    pub fn admin_bypass_enabled(mut self, enabled: bool) -> Self {
        self.config.admin_bypass_enabled = enabled;
        self
    }

    pub fn registry_refresh_interval_secs(mut self, secs: u64) -> Self {
        self.config.registry_refresh_interval_secs = secs;
        self
    }

    pub fn registry_max_staleness_secs(mut self, secs: u64) -> Self {
        self.config.registry_max_staleness_secs = secs;
        self
    }

    /// Validate and build.
    pub fn build(self) -> ConfigurationResult<TenancyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
