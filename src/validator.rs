use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

use crate::audit::{AuditEvent, AuditKind, AuditLog};
use crate::clock::Clock;
use crate::error::TokenError;
use crate::secret::SecretProvider;
use crate::token::{self, CredentialKind};
use crate::types::{Claims, SubjectId};

/// Default maximum credential age.
pub const DEFAULT_WINDOW: Duration = Duration::seconds(300);

/// Default tolerance for credentials stamped ahead of the local clock.
pub const DEFAULT_FUTURE_SKEW: Duration = Duration::seconds(30);

/// Freshness bounds applied after the signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessRules {
    /// Oldest accepted credential; `age == window` is still accepted.
    pub window: Duration,
    /// How far in the future `issued_at` may be before it is rejected.
    pub future_skew: Duration,
}

impl Default for FreshnessRules {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            future_skew: DEFAULT_FUTURE_SKEW,
        }
    }
}

/// Validates a raw credential against the signing `key` at time `now`.
///
/// # Errors
///
/// - [`TokenError::Malformed`] if the credential cannot be decoded
/// - [`TokenError::BadSignature`] if the HMAC does not match
/// - [`TokenError::Expired`] if it is older than `rules.window`
/// - [`TokenError::NotYetValid`] if it is stamped more than `rules.future_skew` ahead of `now`
pub fn validate(
    raw: &str,
    key: &[u8],
    now: OffsetDateTime,
    rules: &FreshnessRules,
) -> Result<Claims, TokenError> {
    let credential = token::decode(raw)?;

    let expected = token::sign(&credential.subject_id, credential.issued_at, key)?;
    if !signatures_match(&expected, &credential.signature) {
        return Err(TokenError::BadSignature);
    }

    let age_secs = now.unix_timestamp().saturating_sub(credential.issued_at);
    if age_secs > rules.window.whole_seconds() {
        return Err(TokenError::Expired { age_secs });
    }
    let ahead_secs = age_secs.saturating_neg();
    if ahead_secs > rules.future_skew.whole_seconds() {
        return Err(TokenError::NotYetValid { ahead_secs });
    }

    Ok(Claims {
        subject_id: SubjectId(credential.subject_id),
        issued_at: credential.issued_at,
    })
}

/// Constant-time signature comparison.
///
/// Both sides are hashed first so that neither a length difference nor the
/// position of the first differing byte changes the work done.
fn signatures_match(expected: &str, supplied: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let supplied = Sha256::digest(supplied.as_bytes());
    expected.as_slice().ct_eq(supplied.as_slice()).into()
}

/// Credential validator bound to a secret, a clock and an audit sink.
///
/// Cheap to clone and safe to share between requests.
#[derive(Clone)]
pub struct TokenValidator {
    secret: Arc<dyn SecretProvider>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditLog>,
    rules: FreshnessRules,
    kind: CredentialKind,
}

impl TokenValidator {
    #[must_use]
    pub fn new(
        secret: Arc<dyn SecretProvider>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            secret,
            clock,
            audit,
            rules: FreshnessRules::default(),
            kind: CredentialKind::Provisioning,
        }
    }

    /// Accept only credentials of `kind`. Defaults to provisioning credentials.
    #[must_use]
    pub fn for_kind(mut self, kind: CredentialKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    #[must_use]
    pub fn with_rules(mut self, rules: FreshnessRules) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &FreshnessRules {
        &self.rules
    }

    /// Validates `raw` at the current clock time, auditing any rejection.
    ///
    /// # Errors
    ///
    /// See [`validate`].
    pub fn validate(&self, raw: &str) -> Result<Claims, TokenError> {
        let now = self.clock.now();
        let verdict = self
            .kind
            .signing_key(self.secret.secret())
            .map_err(TokenError::from)
            .and_then(|key| validate(raw, &key, now, &self.rules));
        match verdict {
            Ok(claims) => {
                tracing::debug!(issued_at = claims.issued_at, "credential accepted");
                Ok(claims)
            }
            Err(e) => {
                self.audit.record(rejection_event(&e, raw, now));
                Err(e)
            }
        }
    }
}

fn rejection_event(error: &TokenError, raw: &str, now: OffsetDateTime) -> AuditEvent {
    let mut event = AuditEvent::new(AuditKind::from(error), now);
    // Re-decode for context only; a malformed credential yields no subject.
    if let Ok(credential) = token::decode(raw) {
        event = event
            .with_subject(&credential.subject_id)
            .with_skew(now.unix_timestamp().saturating_sub(credential.issued_at));
    }
    event
}
