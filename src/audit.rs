//! Security audit events for enforcement denials.
//!
//! Sinks must never block the caller: recording an event is fire-and-forget,
//! and a sink that cannot deliver drops the event after logging that it did.

use crate::enforcer::ResourceKind;
use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Log target used for audit records.
pub const AUDIT_LOG_TARGET: &str = "tenant_isolation::audit";

/// Result recorded by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Denied,
}

/// One security-relevant enforcement outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub tenant_attempted: String,
    pub resource_id: String,
    pub resource_kind: ResourceKind,
    /// Owner recorded on the resource; `None` for legacy rows
    pub resource_tenant: Option<String>,
    pub outcome: AuditOutcome,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_fingerprint: Option<String>,
}

impl AuditEvent {
    /// Build a cross-tenant denial event stamped with the current time.
    pub fn cross_tenant_denial(
        tenant_attempted: impl Into<String>,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        resource_tenant: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            tenant_attempted: tenant_attempted.into(),
            resource_id: resource_id.into(),
            resource_kind,
            resource_tenant,
            outcome: AuditOutcome::Denied,
            reason: ErrorKind::CrossTenantAccess.as_str().to_string(),
            request_id: None,
            actor_fingerprint: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_actor_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.actor_fingerprint = fingerprint;
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Record an event without blocking.
    fn record(&self, event: AuditEvent);
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn record(&self, event: AuditEvent) {
        (**self).record(event)
    }
}

impl<T: AuditSink + ?Sized> AuditSink for Box<T> {
    fn record(&self, event: AuditEvent) {
        (**self).record(event)
    }
}

/// Writes events as JSON to the `log` facade under [`AUDIT_LOG_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => log::warn!(target: AUDIT_LOG_TARGET, "{}", json),
            Err(e) => log::warn!(
                target: AUDIT_LOG_TARGET,
                "denied {} {} to tenant {} (event not serializable: {})",
                event.resource_kind,
                event.resource_id,
                event.tenant_attempted,
                e
            ),
        }
    }
}

/// Forwards events to an unbounded channel drained by a separate task.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::UnboundedSender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Create a sink and the receiver the host should drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Err(mpsc::error::SendError(event)) = self.sender.send(event) {
            log::error!(
                target: AUDIT_LOG_TARGET,
                "audit receiver closed; dropped denial of {} {} for tenant {}",
                event.resource_kind,
                event.resource_id,
                event.tenant_attempted
            );
        }
    }
}

/// Keeps events in memory; intended for tests and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
