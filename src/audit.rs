//! Audit log call site (SPEC_FULL.md §1.2, §6.1). The sink — where an
//! event is durably stored — is an external collaborator out of scope
//! here; only the call site and the two in-tree sink implementations are.

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
    Mask,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub role: String,
    pub table: String,
    pub verb: String,
    pub verdict: Verdict,
    pub rule: Option<String>,
    pub at: chrono::DateTime<chrono::Utc>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Discards every event. The default when no durable sink is configured.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Emits each event as a structured `tracing` record — `warn!` on deny,
/// `info!` otherwise — so audit activity is visible in ordinary log output
/// even with no durable sink wired up.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event.verdict {
            Verdict::Deny => warn!(
                role = %event.role,
                table = %event.table,
                verb = %event.verb,
                rule = event.rule.as_deref().unwrap_or("unspecified"),
                "access denied"
            ),
            Verdict::Allow | Verdict::Mask => info!(
                role = %event.role,
                table = %event.table,
                verb = %event.verb,
                verdict = ?event.verdict,
                "access decision"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_any_event() {
        let sink = NoopAuditSink;
        sink.record(AuditEvent {
            role: "analyst".into(),
            table: "users".into(),
            verb: "SELECT".into(),
            verdict: Verdict::Allow,
            rule: None,
            at: chrono::Utc::now(),
        });
    }
}
