//! Verified identities and the request surface the resolver reads.
//!
//! Claim sets carry their trust state in the type:
//!
//! * **`Claims<Unverified>`**: whatever the caller sent; cannot feed a tenant claim
//! * **`Claims<Verified>`**: only obtainable through a [`ClaimVerifier`]
//!
//! The resolver only accepts an [`AuthenticatedIdentity`], which can only be
//! built from `Claims<Verified>`. Header and host values are different: they
//! become `TenantCandidate<Unverified>` and must earn their way in through the
//! registry.
//!
//! # Example Usage
//!
//! ```rust
//! use tenant_isolation::identity::{
//!     AuthenticatedIdentity, ClaimVerifier, Claims, InboundRequest, UpstreamVerified,
//! };
//! use serde_json::json;
//!
//! // Claims that the identity layer has already checked
//! let raw = Claims::from_json(json!({"sub": "alice", "tenant_id": "acme"}))?;
//! let verified = UpstreamVerified.verify(raw)?;
//!
//! let identity = AuthenticatedIdentity::new("alice", verified);
//! let request = InboundRequest::new()
//!     .with_identity(identity)
//!     .with_host("acme.analytics.example.com");
//!
//! assert!(request.identity().is_some());
//! # Ok::<(), tenant_isolation::identity::IdentityError>(())
//! ```

use crate::context::ContextSource;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Type-level trust states using phantom types
pub trait TrustState: Send + Sync + 'static {}

/// Phantom type for values that have not been verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unverified;
impl TrustState for Unverified {}

/// Phantom type for values vouched for by the identity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verified;
impl TrustState for Verified {}

/// Identity errors
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Claim set must be a JSON object")]
    NotAnObject,
    #[error("Claim verification failed: {reason}")]
    VerificationFailed { reason: String },
}

/// A set of identity claims with compile-time trust state.
#[derive(Debug, Clone)]
pub struct Claims<S: TrustState> {
    values: Map<String, Value>,
    _state: PhantomData<S>,
}

impl Claims<Unverified> {
    /// Create an empty, unverified claim set.
    pub fn new() -> Self {
        Self {
            values: Map::new(),
            _state: PhantomData,
        }
    }

    /// Wrap a JSON object of claims.
    pub fn from_json(value: Value) -> Result<Self, IdentityError> {
        match value {
            Value::Object(values) => Ok(Self {
                values,
                _state: PhantomData,
            }),
            _ => Err(IdentityError::NotAnObject),
        }
    }

    /// Add or replace a claim.
    pub fn insert(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Promote to verified (internal use only; see [`ClaimVerifier::verify`]).
    fn promote(self) -> Claims<Verified> {
        Claims {
            values: self.values,
            _state: PhantomData,
        }
    }
}

impl Default for Claims<Unverified> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TrustState> Claims<S> {
    /// Raw claim value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Claim value as a non-empty trimmed string.
    ///
    /// Numbers are stringified; every other JSON type is treated as absent.
    pub fn string_claim(&self, name: &str) -> Option<String> {
        let value = match self.values.get(name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if value.is_empty() { None } else { Some(value) }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Claims<Verified> {
    /// Extract the tenant candidate from the first field that carries one.
    pub fn tenant_candidate<'a, I>(&self, fields: I) -> Option<TenantCandidate<Verified>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields.into_iter().find_map(|field| {
            self.string_claim(field).map(|value| TenantCandidate {
                value,
                source: ContextSource::Claim,
                _state: PhantomData,
            })
        })
    }
}

/// Gatekeeper between raw and verified claims.
///
/// Implementors supply `check`; the provided `verify` is the only way to
/// obtain `Claims<Verified>`.
pub trait ClaimVerifier {
    /// Decide whether the claim set can be trusted.
    fn check(&self, claims: &Claims<Unverified>) -> Result<(), IdentityError>;

    /// Consume raw claims and return them as verified if `check` passes.
    fn verify(&self, claims: Claims<Unverified>) -> Result<Claims<Verified>, IdentityError> {
        self.check(&claims)?;
        Ok(claims.promote())
    }
}

/// Verifier for hosts whose identity middleware already validated the token.
///
/// Use only where signature checks have run before the claims reach this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpstreamVerified;

impl ClaimVerifier for UpstreamVerified {
    fn check(&self, _claims: &Claims<Unverified>) -> Result<(), IdentityError> {
        Ok(())
    }
}

/// A tenant identifier proposed by one resolution source.
///
/// `TenantCandidate<Verified>` can only come from verified claims; everything
/// else is `TenantCandidate<Unverified>`. Both still go through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantCandidate<S: TrustState> {
    value: String,
    source: ContextSource,
    _state: PhantomData<S>,
}

impl TenantCandidate<Unverified> {
    /// Wrap untrusted input (header, host label or configured default).
    pub fn untrusted(value: impl Into<String>, source: ContextSource) -> Self {
        Self {
            value: value.into(),
            source,
            _state: PhantomData,
        }
    }
}

impl<S: TrustState> TenantCandidate<S> {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> ContextSource {
        self.source
    }
}

/// An identity established by the (external) authentication layer.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    subject: String,
    claims: Claims<Verified>,
    administrator: bool,
}

impl AuthenticatedIdentity {
    pub fn new(subject: impl Into<String>, claims: Claims<Verified>) -> Self {
        Self {
            subject: subject.into(),
            claims,
            administrator: false,
        }
    }

    /// Flag the identity as holding the administrator capability.
    pub fn with_administrator_capability(mut self) -> Self {
        self.administrator = true;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn claims(&self) -> &Claims<Verified> {
        &self.claims
    }

    pub fn is_administrator(&self) -> bool {
        self.administrator
    }
}

/// The parts of an inbound request that tenant resolution reads.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    identity: Option<AuthenticatedIdentity>,
    // keys are lower-cased header names
    headers: HashMap<String, String>,
    host: Option<String>,
}

impl InboundRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: AuthenticatedIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set a header; names are case-insensitive and later values replace earlier ones.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        self.identity.as_ref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}
