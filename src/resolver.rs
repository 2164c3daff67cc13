//! Tenant resolution for inbound requests.
//!
//! Candidates are considered in a fixed order and the first one present wins:
//!
//! 1. verified identity claim (`tenantClaimField`, then `fallbackClaimFields`)
//! 2. tenant header, when header resolution is enabled
//! 3. first label of the request host, when subdomain resolution is enabled
//! 4. configured default tenant
//!
//! Whatever wins must be a registered, active tenant. Nothing is guessed: an
//! unusable candidate is an error, never a fall-through to the next source.
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::config::TenancyConfig;
//! use tenant_isolation::context::{ContextSource, TenantId};
//! use tenant_isolation::identity::{AuthenticatedIdentity, ClaimVerifier, Claims, InboundRequest, UpstreamVerified};
//! use tenant_isolation::registry::{InMemoryRegistryStore, TenantRegistryEntry};
//! use tenant_isolation::resolver::TenantContextResolver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = InMemoryRegistryStore::builder()
//!     .with_entry(TenantRegistryEntry::new(TenantId::parse("acme")?, "Acme"))
//!     .build();
//! let resolver = TenantContextResolver::new(TenancyConfig::default(), registry)?;
//!
//! let claims = UpstreamVerified.verify(Claims::new().insert("tenant_id", "acme"))?;
//! let request = InboundRequest::new().with_identity(AuthenticatedIdentity::new("alice", claims));
//!
//! let context = resolver.resolve(&request).await?;
//! assert_eq!(context.tenant_id(), "acme");
//! assert_eq!(context.source(), ContextSource::Claim);
//! # Ok(())
//! # }
//! ```

use crate::config::TenancyConfig;
use crate::context::{ContextSource, RequestScope, TenantContext, TenantId};
use crate::error::{ConfigurationResult, TenancyError, TenancyResult};
use crate::identity::{InboundRequest, TenantCandidate, Unverified, Verified};
use crate::registry::TenantRegistry;
use std::iter;
use url::Host;

/// Header a host may use to propagate its own request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// The candidate chosen by precedence, before registry validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedCandidate {
    /// From verified identity claims
    Trusted(TenantCandidate<Verified>),
    /// From a header, the host name or configuration
    Untrusted(TenantCandidate<Unverified>),
}

impl SelectedCandidate {
    pub fn value(&self) -> &str {
        match self {
            SelectedCandidate::Trusted(candidate) => candidate.value(),
            SelectedCandidate::Untrusted(candidate) => candidate.value(),
        }
    }

    pub fn source(&self) -> ContextSource {
        match self {
            SelectedCandidate::Trusted(candidate) => candidate.source(),
            SelectedCandidate::Untrusted(candidate) => candidate.source(),
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, SelectedCandidate::Trusted(_))
    }
}

/// Produces the [`TenantContext`] for a request.
#[derive(Debug, Clone)]
pub struct TenantContextResolver<R> {
    config: TenancyConfig,
    registry: R,
}

impl<R: TenantRegistry> TenantContextResolver<R> {
    /// Create a resolver, rejecting an invalid configuration up front.
    pub fn new(config: TenancyConfig, registry: R) -> ConfigurationResult<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Pick the candidate by precedence without consulting the registry.
    ///
    /// A tenant header on an anonymous request that may not use one fails
    /// with `Unresolved` rather than falling through to later sources.
    pub fn select_candidate(&self, request: &InboundRequest) -> TenancyResult<SelectedCandidate> {
        let header = self.header_candidate(request)?;

        if let Some(identity) = request.identity() {
            let fields = iter::once(self.config.tenant_claim_field.as_str())
                .chain(self.config.fallback_claim_fields.iter().map(String::as_str));
            if let Some(claimed) = identity.claims().tenant_candidate(fields) {
                if let Some(header) = &header {
                    if header.value() != claimed.value() {
                        log::warn!(
                            "Tenant header '{}' disagrees with claim '{}' for subject fingerprint {}; using claim",
                            header.value(),
                            claimed.value(),
                            crate::context::fingerprint(identity.subject())
                        );
                    }
                }
                return Ok(SelectedCandidate::Trusted(claimed));
            }
        }

        if let Some(header) = header {
            return Ok(SelectedCandidate::Untrusted(header));
        }

        if let Some(label) = self.subdomain_candidate(request) {
            return Ok(SelectedCandidate::Untrusted(label));
        }

        match &self.config.default_tenant_id {
            Some(default) => Ok(SelectedCandidate::Untrusted(TenantCandidate::untrusted(
                default.clone(),
                ContextSource::Default,
            ))),
            None => {
                log::warn!("Tenant resolution failed: no candidate from any source");
                Err(TenancyError::Unresolved)
            }
        }
    }

    /// Resolve and validate the acting tenant for `request`.
    pub async fn resolve(&self, request: &InboundRequest) -> TenancyResult<TenantContext> {
        let candidate = self.select_candidate(request)?;

        let tenant_id = match TenantId::parse(candidate.value()) {
            Ok(id) => id,
            Err(e) => {
                log::warn!(
                    "Tenant resolution failed: malformed {} candidate: {}",
                    candidate.source(),
                    e
                );
                return Err(TenancyError::unknown_tenant(candidate.value()));
            }
        };

        let entry = match self.registry.lookup(tenant_id.as_str()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                log::warn!(
                    "Tenant resolution failed: unknown tenant '{}' from {}",
                    tenant_id,
                    candidate.source()
                );
                return Err(TenancyError::unknown_tenant(tenant_id.as_str()));
            }
            Err(e) => {
                log::warn!("Tenant resolution failed: {}", e);
                return Err(e);
            }
        };

        if !entry.is_active() {
            log::warn!(
                "Tenant resolution failed: tenant '{}' from {} is inactive",
                tenant_id,
                candidate.source()
            );
            return Err(TenancyError::inactive_tenant(tenant_id.as_str()));
        }

        let admin = self.config.admin_bypass_enabled
            && request.identity().is_some_and(|i| i.is_administrator());

        let context = if admin {
            TenantContext::with_admin_override(tenant_id, candidate.source())
        } else {
            TenantContext::new(tenant_id, candidate.source())
        };

        log::debug!(
            "Resolved tenant '{}' from {} (admin override: {})",
            context.tenant_id(),
            context.source(),
            context.is_admin_override()
        );
        Ok(context)
    }

    /// Resolve and wrap the context in a [`RequestScope`].
    ///
    /// The request id comes from `X-Request-ID` when present, otherwise a new
    /// one is generated. The identity subject, if any, is fingerprinted.
    pub async fn resolve_scope(&self, request: &InboundRequest) -> TenancyResult<RequestScope> {
        let context = self.resolve(request).await?;
        let scope = match request
            .header(REQUEST_ID_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(request_id) => RequestScope::with_request_id(request_id, context),
            None => RequestScope::new(context),
        };
        Ok(match request.identity() {
            Some(identity) => scope.with_actor(identity.subject()),
            None => scope,
        })
    }

    fn header_candidate(
        &self,
        request: &InboundRequest,
    ) -> TenancyResult<Option<TenantCandidate<Unverified>>> {
        if !self.config.enable_header_resolution {
            return Ok(None);
        }
        let Some(value) = request
            .header(&self.config.tenant_header_name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return Ok(None);
        };

        if request.identity().is_none() && !self.config.header_allowed_without_identity() {
            log::warn!(
                "Tenant resolution failed: {} header on unauthenticated request",
                self.config.tenant_header_name
            );
            return Err(TenancyError::Unresolved);
        }
        Ok(Some(TenantCandidate::untrusted(value, ContextSource::Header)))
    }

    fn subdomain_candidate(&self, request: &InboundRequest) -> Option<TenantCandidate<Unverified>> {
        if !self.config.enable_subdomain_resolution {
            return None;
        }
        let label = tenant_subdomain(request.host()?, &self.config)?;
        Some(TenantCandidate::untrusted(label, ContextSource::Subdomain))
    }
}

/// First host label, if the host looks like `<tenant>.<domain>.<tld>`.
///
/// Ports are stripped and the result is lower-cased. IP literals, hosts with
/// fewer than three labels and reserved labels yield `None`.
pub fn tenant_subdomain(host: &str, config: &TenancyConfig) -> Option<String> {
    let host = host.trim();
    if host.starts_with('[') {
        return None;
    }
    let host = host.split(':').next()?.trim_end_matches('.');
    let host = host.to_ascii_lowercase();

    match Host::parse(&host) {
        Ok(Host::Domain(_)) => {}
        _ => return None,
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 || labels.iter().any(|label| label.is_empty()) {
        return None;
    }
    let first = labels[0];
    if config.is_reserved_subdomain(first) {
        return None;
    }
    Some(first.to_string())
}
