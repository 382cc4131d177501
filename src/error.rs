/// Wire-format errors raised by the credential codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FormatError {
    #[error("credential is not valid base64")]
    NotBase64,
    #[error("credential payload is not valid UTF-8")]
    NotUtf8,
    #[error("expected 3 fields, got {0}")]
    FieldCount(usize),
    #[error("credential field is empty")]
    EmptyField,
    #[error("issued-at is not a canonical integer")]
    InvalidTimestamp,
    #[error("subject id contains the field separator")]
    ReservedSeparator,
    #[error("signing key rejected")]
    InvalidKey,
}

/// Credential validation failures.
///
/// Display strings never carry the secret or the supplied signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    #[error("malformed credential: {0}")]
    Malformed(#[from] FormatError),
    #[error("credential signature mismatch")]
    BadSignature,
    #[error("credential expired ({age_secs}s old)")]
    Expired { age_secs: i64 },
    #[error("credential issued {ahead_secs}s in the future")]
    NotYetValid { ahead_secs: i64 },
}

/// Errors reported by a [`UserStore`](crate::store::UserStore) or
/// [`SessionStore`](crate::session::SessionStore) implementation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A record with the same unique key already exists.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

/// User provisioning failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisioningError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// Create lost a race and the winning record could not be re-fetched.
    #[error("concurrent provisioning conflict for {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ProvisioningError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(key) => Self::Conflict(key),
            other => Self::Store(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Token error: {0}")]
    Token(#[from] TokenError),
    #[error("Credential format error: {0}")]
    Format(#[from] FormatError),
    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),
    #[cfg(feature = "issuer")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Peer site {operation} failed (status {status:?}): {detail}")]
    Peer {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("Configuration error: {0}")]
    Config(String),
}
