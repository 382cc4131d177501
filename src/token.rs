use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::FormatError;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '|';

/// A decoded, not yet verified credential.
///
/// Wire form: `base64(subject_id "|" issued_at "|" hex(HMAC-SHA256(key, subject_id "|" issued_at)))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub subject_id: String,
    /// Unix seconds.
    pub issued_at: i64,
    /// Lowercase hex HMAC-SHA256, exactly as received.
    pub signature: String,
}

const HANDOFF_KEY_LABEL: &[u8] = b"site-auth-bridge/handoff";

/// Which leg of the bridge a credential authorizes.
///
/// Each kind is signed with its own key, so a credential minted for one leg
/// fails signature verification on the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialKind {
    /// Server-to-server provisioning request. Signed with the shared secret.
    #[default]
    Provisioning,
    /// Browser-visible login-redirect credential for a local user id.
    /// Signed with `HMAC-SHA256(secret, "site-auth-bridge/handoff")`.
    Handoff,
}

impl CredentialKind {
    /// Signing key for this kind of credential.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidKey`] if HMAC rejects the secret.
    pub fn signing_key(self, secret: &[u8]) -> Result<Vec<u8>, FormatError> {
        match self {
            Self::Provisioning => Ok(secret.to_vec()),
            Self::Handoff => mac_bytes(secret, HANDOFF_KEY_LABEL),
        }
    }
}

fn signing_input(subject_id: &str, issued_at: i64) -> String {
    format!("{subject_id}{SEPARATOR}{issued_at}")
}

fn mac_bytes(key: &[u8], message: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| FormatError::InvalidKey)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes `hex(HMAC-SHA256(key, "subject_id|issued_at"))`.
///
/// # Errors
///
/// Returns [`FormatError::InvalidKey`] if HMAC rejects the key.
pub fn sign(subject_id: &str, issued_at: i64, key: &[u8]) -> Result<String, FormatError> {
    let digest = mac_bytes(key, signing_input(subject_id, issued_at).as_bytes())?;
    Ok(hex::encode(digest))
}

/// Encodes a credential for `subject_id` issued at `issued_at`, signed
/// with `key` (see [`CredentialKind::signing_key`]).
///
/// # Errors
///
/// Returns [`FormatError::EmptyField`] for an empty subject and
/// [`FormatError::ReservedSeparator`] if the subject contains `|`; such
/// credentials could never be decoded.
pub fn encode(subject_id: &str, issued_at: i64, key: &[u8]) -> Result<String, FormatError> {
    if subject_id.is_empty() {
        return Err(FormatError::EmptyField);
    }
    if subject_id.contains(SEPARATOR) {
        return Err(FormatError::ReservedSeparator);
    }
    let signature = sign(subject_id, issued_at, key)?;
    let payload = format!("{subject_id}{SEPARATOR}{issued_at}{SEPARATOR}{signature}");
    Ok(STANDARD.encode(payload))
}

/// Decodes a raw credential without verifying it.
///
/// No trimming or case folding is applied: the fields must match the issuer's
/// bytes exactly.
///
/// # Errors
///
/// Returns a [`FormatError`] unless the payload is base64 of UTF-8 text that
/// splits on `|` into exactly three non-empty fields, the second being a
/// canonical decimal integer.
pub fn decode(raw: &str) -> Result<Credential, FormatError> {
    let bytes = STANDARD.decode(raw).map_err(|_| FormatError::NotBase64)?;
    let payload = String::from_utf8(bytes).map_err(|_| FormatError::NotUtf8)?;

    let fields: Vec<&str> = payload.split(SEPARATOR).collect();
    let [subject_id, issued_at, signature] = fields.as_slice() else {
        return Err(FormatError::FieldCount(fields.len()));
    };
    if subject_id.is_empty() || issued_at.is_empty() || signature.is_empty() {
        return Err(FormatError::EmptyField);
    }

    // The signature covers the literal text, so "+5" or "007" must not be
    // accepted as 5 or 7.
    let parsed: i64 = issued_at
        .parse()
        .map_err(|_| FormatError::InvalidTimestamp)?;
    if parsed.to_string() != *issued_at {
        return Err(FormatError::InvalidTimestamp);
    }

    Ok(Credential {
        subject_id: (*subject_id).to_string(),
        issued_at: parsed,
        signature: (*signature).to_string(),
    })
}
