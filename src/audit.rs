//! Audit trail for rejected bridge requests.
//!
//! Every credential rejection, provisioning refusal and failed login handoff is
//! reported through an [`AuditLog`] so that secret mismatches or clock drift
//! between sites can be diagnosed. Events carry a hash of the subject id, never
//! the raw id, the secret or the supplied signature.

use std::fmt;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::error::TokenError;

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Malformed,
    BadSignature,
    Expired,
    NotYetValid,
    MissingField,
    ProvisioningConflict,
    UserNotFound,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::BadSignature => write!(f, "bad_signature"),
            Self::Expired => write!(f, "expired"),
            Self::NotYetValid => write!(f, "not_yet_valid"),
            Self::MissingField => write!(f, "missing_field"),
            Self::ProvisioningConflict => write!(f, "provisioning_conflict"),
            Self::UserNotFound => write!(f, "user_not_found"),
        }
    }
}

impl From<&TokenError> for AuditKind {
    fn from(e: &TokenError) -> Self {
        match e {
            TokenError::Malformed(_) => Self::Malformed,
            TokenError::BadSignature => Self::BadSignature,
            TokenError::Expired { .. } => Self::Expired,
            TokenError::NotYetValid { .. } => Self::NotYetValid,
        }
    }
}

/// A single rejection record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub kind: AuditKind,
    /// Truncated SHA-256 of the subject id, if one was decoded.
    pub subject_hash: Option<String>,
    /// `now - issued_at` in seconds, when the credential carried a timestamp.
    pub skew_secs: Option<i64>,
    pub at: OffsetDateTime,
}

impl AuditEvent {
    #[must_use]
    pub fn new(kind: AuditKind, at: OffsetDateTime) -> Self {
        Self {
            kind,
            subject_hash: None,
            skew_secs: None,
            at,
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject_id: &str) -> Self {
        self.subject_hash = Some(redact_subject(subject_id));
        self
    }

    #[must_use]
    pub fn with_skew(mut self, skew_secs: i64) -> Self {
        self.skew_secs = Some(skew_secs);
        self
    }
}

/// First 16 hex characters of `SHA-256(subject_id)`.
#[must_use]
pub fn redact_subject(subject_id: &str) -> String {
    let digest = Sha256::digest(subject_id.as_bytes());
    hex::encode(&digest[..8])
}

/// Sink for audit events.
pub trait AuditLog: Send + Sync + 'static {
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as `tracing` warnings on the `site_auth_bridge::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: AuditEvent) {
        tracing::warn!(
            target: "site_auth_bridge::audit",
            kind = %event.kind,
            subject = event.subject_hash.as_deref().unwrap_or("-"),
            skew_secs = event.skew_secs,
            at = event.at.unix_timestamp(),
            "bridge request rejected"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLog;

impl AuditLog for NoopAuditLog {
    fn record(&self, _event: AuditEvent) {}
}

/// Keeps events in memory; used by tests to assert on the audit trail.
#[derive(Debug, Default)]
pub struct RecordingAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<AuditKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl AuditLog for RecordingAuditLog {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
