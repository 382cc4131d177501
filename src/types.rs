use std::collections::BTreeSet;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identity asserted by a credential (the issuer's user id, or a local user
/// id for login-redirect handoffs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Store-defined user identifier (opaque string).
///
/// Returned by [`UserStore::create`](crate::store::UserStore::create).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Store-defined session identifier (opaque string).
///
/// Returned by [`SessionStore::create`](crate::session::SessionStore::create).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Trusted fields extracted from a validated credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: SubjectId,
    /// Unix seconds.
    pub issued_at: i64,
}

/// Profile data carried next to the credential in a provisioning request.
///
/// Not covered by the credential signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub display_name: String,
}

impl UserProfile {
    #[must_use]
    pub fn new(email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            roles: BTreeSet::new(),
            display_name: String::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// Durable local user record, owned by the [`UserStore`](crate::store::UserStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub roles: BTreeSet<String>,
    /// `None` means local password login is disabled.
    pub password_hash: Option<String>,
    pub locale: String,
}

/// Fields for a record that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub roles: BTreeSet<String>,
    pub locale: String,
}

/// Body of `POST /auth/login` on a satellite.
///
/// Every field defaults so that absent values reach validation and produce
/// the protocol's own 403/400 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub name: String,
    /// Always ignored by the satellite: bridged accounts are passwordless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl LoginRequest {
    #[must_use]
    pub fn new(token: String, profile: &UserProfile) -> Self {
        Self {
            token,
            email: profile.email.clone(),
            username: profile.username.clone(),
            roles: profile.roles.clone(),
            name: profile.display_name.clone(),
            password: None,
        }
    }

    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            email: self.email.clone(),
            username: self.username.clone(),
            roles: self.roles.clone(),
            display_name: self.name.clone(),
        }
    }
}

/// Satellite response to a successful provisioning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub uid: UserId,
}

/// Lookup key for an email address: the domain part is lowercased, the local
/// part is kept byte-for-byte.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_ascii_lowercase()),
        None => email.to_string(),
    }
}
