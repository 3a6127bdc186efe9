//! Security audit logging.
//!
//! Rejected credentials and exhausted quotas are logged on the `audit`
//! target with an `event_type` field for alerting.

use tracing::{info, warn};

/// Security-relevant events of the API.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// App token missing, malformed or unknown.
    AppAuthFailure { path: String, reason: String },
    /// User session or backend user id rejected.
    UserAuthFailure { namespace: String, path: String, reason: String },
    /// App exceeded its request quota.
    RateLimited { namespace: String, limit: i64, remaining: i64 },
    /// A user logged in.
    Login { namespace: String, user_id: u64 },
}

/// Log a security audit event with structured fields.
pub fn log_audit_event(event: AuditEvent) {
    match event {
        AuditEvent::AppAuthFailure { path, reason } => {
            warn!(
                target: "audit",
                event_type = "app_auth_failure",
                %path,
                %reason,
                "Application authentication failed"
            );
        },
        AuditEvent::UserAuthFailure {
            namespace,
            path,
            reason,
        } => {
            warn!(
                target: "audit",
                event_type = "user_auth_failure",
                %namespace,
                %path,
                %reason,
                "User authentication failed"
            );
        },
        AuditEvent::RateLimited {
            namespace,
            limit,
            remaining,
        } => {
            warn!(
                target: "audit",
                event_type = "rate_limited",
                %namespace,
                limit,
                remaining,
                "Rate limit exceeded"
            );
        },
        AuditEvent::Login { namespace, user_id } => {
            info!(
                target: "audit",
                event_type = "login",
                %namespace,
                user_id,
                "User logged in"
            );
        },
    }
}
