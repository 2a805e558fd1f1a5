//! Security incident logging.
//!
//! Rate limit violations are treated as security-relevant events, not just
//! operational noise. The middleware reports them through the [`AuditSink`]
//! trait after the deny decision has already been made, so a sink can never
//! delay or fail a rate limit check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Classification of a security incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum IncidentKind {
    /// A client exhausted its request quota for an endpoint.
    RateLimitExceeded,
}

impl IncidentKind {
    /// Wire/log name of this incident kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }

    /// Severity this kind is classified at.
    ///
    /// Quota exhaustion routes to high-visibility output: it is the usual
    /// first signal of credential stuffing or scraping.
    pub fn severity(&self) -> Severity {
        match self {
            IncidentKind::RateLimitExceeded => Severity::Critical,
        }
    }
}

impl std::fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level of a security incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// A single security incident record.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    /// Unique id for correlating log lines.
    pub id: Uuid,
    pub kind: IncidentKind,
    /// Endpoint identifier the incident occurred on.
    pub endpoint: String,
    /// Client identity, already redacted.
    pub identity: String,
    /// Free-form structured details.
    pub details: Value,
    pub occurred_at: DateTime<Utc>,
}

impl Incident {
    /// Create an incident, redacting the client identity before it is stored.
    pub fn new(kind: IncidentKind, identity: &str, endpoint: &str, details: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            endpoint: endpoint.to_string(),
            identity: redact_identity(identity),
            details,
            occurred_at: Utc::now(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

/// Mask the tail of a client identity before it reaches log output.
///
/// For dotted or colon-separated addresses the last segment is replaced;
/// anything else keeps a short prefix. The result still groups repeat
/// offenders without recording a full address.
pub fn redact_identity(identity: &str) -> String {
    if let Some(idx) = identity.rfind(['.', ':']) {
        return format!("{}xxx", &identity[..=idx]);
    }
    let head: String = identity.chars().take(4).collect();
    if head.len() < identity.len() {
        format!("{head}***")
    } else {
        identity.to_string()
    }
}

/// Destination for security incidents.
///
/// Implementations must not block the caller meaningfully and must not
/// fail it: the rate limit response has already been decided by the time
/// an incident is reported.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an incident.
    async fn log_incident(&self, incident: &Incident);
}

/// [`AuditSink`] that emits structured `tracing` events, routed by severity.
#[derive(Debug, Default)]
pub struct TracingAuditLog;

impl TracingAuditLog {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditLog {
    async fn log_incident(&self, incident: &Incident) {
        match incident.severity() {
            Severity::Critical | Severity::High => error!(
                incident_id = %incident.id,
                kind = %incident.kind,
                severity = %incident.severity(),
                endpoint = %incident.endpoint,
                identity = %incident.identity,
                details = %incident.details,
                "Security incident"
            ),
            Severity::Medium => warn!(
                incident_id = %incident.id,
                kind = %incident.kind,
                severity = %incident.severity(),
                endpoint = %incident.endpoint,
                identity = %incident.identity,
                details = %incident.details,
                "Security incident"
            ),
            Severity::Low => info!(
                incident_id = %incident.id,
                kind = %incident.kind,
                severity = %incident.severity(),
                endpoint = %incident.endpoint,
                identity = %incident.identity,
                details = %incident.details,
                "Security incident"
            ),
        }
    }
}

/// [`AuditSink`] that collects incidents in memory.
///
/// This is primarily useful for testing.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    incidents: parking_lot::Mutex<Vec<Incident>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all incidents recorded so far.
    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn log_incident(&self, incident: &Incident) {
        self.incidents.lock().push(incident.clone());
    }
}
