use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, StoreError};
use crate::types::{SessionId, UserId};

pub const DEFAULT_SESSION_COOKIE: &str = "__bridge_session";

/// Data for a session about to be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: UserId,
    pub expires_at: OffsetDateTime,
    /// Client `User-Agent` header value.
    pub user_agent: Option<String>,
    /// Client IP address.
    pub ip_address: Option<String>,
}

/// A live session as returned by [`SessionStore::find`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub expires_at: OffsetDateTime,
}

/// Consumer-provided session persistence.
///
/// Sessions are identified by opaque ids chosen by the store.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for MyAppState {
///     async fn create(&self, session: NewSession) -> Result<SessionId, StoreError> {
///         let id = generate_session_id();
///         self.db.insert_session(&id, &session).await.map_err(StoreError::backend)?;
///         Ok(id)
///     }
///     // ...
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Start a session. Returns its id.
    fn create(
        &self,
        session: NewSession,
    ) -> impl Future<Output = Result<SessionId, StoreError>> + Send;

    /// Look up a session. Expired sessions are reported as `None`.
    fn find(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Invalidate a session (logout). Deleting an unknown id is not an error.
    fn delete(&self, session_id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Generates an unguessable session id (32 random bytes, base64url).
#[must_use]
pub fn generate_session_id() -> SessionId {
    let random_bytes: [u8; 32] = rand::rng().random();
    SessionId(URL_SAFE_NO_PAD.encode(random_bytes))
}

/// In-memory [`SessionStore`]. Expired sessions are dropped on each
/// `create`.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewSession) -> Result<SessionId, StoreError> {
        let id = generate_session_id();
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                user_id: session.user_id,
                expires_at: session.expires_at,
            },
        );
        Ok(id)
    }

    async fn find(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .filter(|s| s.expires_at > now)
            .cloned())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

/// Session cookie settings shared by login and logout so the cookie that is
/// expired on logout is always the one that was set on login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookieSettings {
    pub name: String,
    pub ttl: Duration,
    /// `Secure` attribute on the session cookie. The logout cookie is always secure.
    pub secure: bool,
}

impl Default for SessionCookieSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_SESSION_COOKIE.into(),
            ttl: Duration::days(30),
            secure: true,
        }
    }
}

/// A `Set-Cookie` the HTTP layer must emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieInstruction {
    pub name: String,
    pub value: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub max_age: Duration,
    pub expires: OffsetDateTime,
}

impl CookieInstruction {
    /// Cookie carrying a freshly created session id.
    #[must_use]
    pub fn session(settings: &SessionCookieSettings, session_id: &SessionId, now: OffsetDateTime) -> Self {
        Self {
            name: settings.name.clone(),
            value: session_id.to_string(),
            path: "/".into(),
            secure: settings.secure,
            http_only: true,
            max_age: settings.ttl,
            expires: now + settings.ttl,
        }
    }

    /// Empty cookie with the same name, dated one hour before `now`.
    #[must_use]
    pub fn expire(name: &str, now: OffsetDateTime) -> Self {
        Self {
            name: name.to_string(),
            value: String::new(),
            path: "/".into(),
            secure: true,
            http_only: true,
            max_age: Duration::ZERO,
            expires: now - Duration::hours(1),
        }
    }

    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.max_age <= Duration::ZERO
    }
}

/// Where the browser is sent next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Path on this site.
    Local(String),
    /// Operator-configured absolute URL, exempt from open-redirect checks.
    Trusted(Url),
}

impl RedirectTarget {
    /// A same-site path. Rejects anything a browser could resolve off-site.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless `path` starts with a single `/`.
    pub fn local(path: impl Into<String>) -> Result<Self, Error> {
        let path = path.into();
        if !path.starts_with('/') || path.starts_with("//") || path.starts_with("/\\") {
            return Err(Error::Config(format!("redirect path must be site-relative: {path}")));
        }
        Ok(Self::Local(path))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local(path) => path,
            Self::Trusted(url) => url.as_str(),
        }
    }
}

/// Redirect plus the cookies to set on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInstruction {
    pub target: RedirectTarget,
    pub cookies: Vec<CookieInstruction>,
}

impl RedirectInstruction {
    #[must_use]
    pub fn to(target: RedirectTarget) -> Self {
        Self {
            target,
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: CookieInstruction) -> Self {
        self.cookies.push(cookie);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    #[test]
    fn session_ids_are_url_safe_and_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 43);
        assert!(a.0.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn memory_store_hides_expired_sessions() {
        let clock = Arc::new(FixedClock::at(1_000));
        let store = MemorySessionStore::with_clock(clock.clone());

        let id = store
            .create(NewSession {
                user_id: UserId("1".into()),
                expires_at: at(2_000),
                user_agent: None,
                ip_address: None,
            })
            .await
            .unwrap();

        assert_eq!(store.find(&id).await.unwrap().unwrap().user_id, UserId("1".into()));

        clock.set(2_000);
        assert!(store.find(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_prunes_expired_sessions() {
        let clock = Arc::new(FixedClock::at(1_000));
        let store = MemorySessionStore::with_clock(clock.clone());
        let session = |expires_at| NewSession {
            user_id: UserId("1".into()),
            expires_at: at(expires_at),
            user_agent: None,
            ip_address: None,
        };

        for _ in 0..3 {
            store.create(session(2_000)).await.unwrap();
        }
        let live = store.create(session(5_000)).await.unwrap();
        assert_eq!(store.len().await, 4);

        clock.set(2_000);
        let fresh = store.create(session(6_000)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.find(&live).await.unwrap().is_some());
        assert!(store.find(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemorySessionStore::new();
        let id = SessionId("missing".into());
        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[test]
    fn session_cookie_uses_configured_name_and_ttl() {
        let settings = SessionCookieSettings {
            name: "SESSabc".into(),
            ttl: Duration::hours(2),
            secure: false,
        };
        let cookie = CookieInstruction::session(&settings, &SessionId("sid".into()), at(0));

        assert_eq!(cookie.name, "SESSabc");
        assert_eq!(cookie.value, "sid");
        assert_eq!(cookie.path, "/");
        assert!(cookie.http_only);
        assert!(!cookie.secure);
        assert_eq!(cookie.expires, at(7_200));
        assert!(!cookie.is_removal());
    }

    #[test]
    fn expire_cookie_is_in_the_past() {
        let now = at(1_700_000_000);
        let cookie = CookieInstruction::expire("SESSabc", now);

        assert_eq!(cookie.name, "SESSabc");
        assert!(cookie.value.is_empty());
        assert!(cookie.secure && cookie.http_only);
        assert!(cookie.expires < now);
        assert!(cookie.is_removal());
    }

    #[test]
    fn local_redirects_must_stay_on_site() {
        assert_eq!(RedirectTarget::local("/user/login").unwrap().as_str(), "/user/login");
        assert!(RedirectTarget::local("https://evil.example").is_err());
        assert!(RedirectTarget::local("//evil.example").is_err());
        assert!(RedirectTarget::local("/\\evil.example").is_err());
    }
}
