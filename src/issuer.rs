use std::sync::Arc;

use crate::clock::Clock;
use crate::error::FormatError;
use crate::secret::SecretProvider;
use crate::token::{self, CredentialKind};

/// Mints credentials on the centralized site.
///
/// Uses the same codec as [`TokenValidator`](crate::validator::TokenValidator),
/// so the two sides cannot drift apart.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Arc<dyn SecretProvider>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: Arc<dyn SecretProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    /// Issues a provisioning credential for `subject_id` (the centralized
    /// site's user id) stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the subject cannot be encoded.
    pub fn issue(&self, subject_id: &str) -> Result<String, FormatError> {
        self.issue_kind(CredentialKind::Provisioning, subject_id)
    }

    /// Issues a login-redirect handoff credential for a satellite's local
    /// `user_id`. Only a handoff validator accepts it.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the id cannot be encoded.
    pub fn issue_handoff(&self, user_id: &str) -> Result<String, FormatError> {
        self.issue_kind(CredentialKind::Handoff, user_id)
    }

    fn issue_kind(&self, kind: CredentialKind, subject_id: &str) -> Result<String, FormatError> {
        let key = kind.signing_key(self.secret.secret())?;
        token::encode(subject_id, self.clock.now().unix_timestamp(), &key)
    }
}
