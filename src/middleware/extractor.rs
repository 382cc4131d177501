use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;
use time::OffsetDateTime;

use super::error::BridgeError;
use crate::error::StoreError;
use crate::session::{Session, SessionStore};
use crate::types::{SessionId, UserId};

/// Authenticated user extracted from the session cookie.
///
/// Use as an Axum extractor in route handlers. Returns `401 Unauthorized`
/// if no valid session exists. The router state must provide a
/// [`SessionAccess`] through [`FromRef`].
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(user: SessionUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<SessionUser>) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}", u.user_id),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionUser {
    /// Session ID (from cookie).
    pub session_id: SessionId,
    /// Local user ID (from `SessionStore::find`).
    pub user_id: UserId,
    pub expires_at: OffsetDateTime,
}

/// What [`SessionUser`] needs to resolve a request: the session store, the
/// cookie name and the key that decrypts it.
#[derive(Clone)]
pub struct SessionAccess {
    sessions: Arc<dyn SessionStoreDyn>,
    cookie_name: String,
    cookie_key: Key,
}

impl SessionAccess {
    #[must_use]
    pub fn new<S: SessionStore>(sessions: Arc<S>, cookie_name: impl Into<String>, cookie_key: Key) -> Self {
        Self {
            sessions,
            cookie_name: cookie_name.into(),
            cookie_key,
        }
    }

    async fn resolve(&self, parts: &Parts) -> Result<Option<SessionUser>, BridgeError> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, self.cookie_key.clone());

        let Some(session_id) = jar
            .get(&self.cookie_name)
            .map(|c| SessionId(c.value().to_string()))
        else {
            return Ok(None);
        };

        let session = self.sessions.find_dyn(&session_id).await?;
        Ok(session.map(|s| SessionUser {
            session_id: s.id,
            user_id: s.user_id,
            expires_at: s.expires_at,
        }))
    }
}

impl<St> FromRequestParts<St> for SessionUser
where
    SessionAccess: FromRef<St>,
    St: Send + Sync,
{
    type Rejection = BridgeError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        SessionAccess::from_ref(state)
            .resolve(parts)
            .await?
            .ok_or(BridgeError::Unauthenticated)
    }
}

impl<St> OptionalFromRequestParts<St> for SessionUser
where
    SessionAccess: FromRef<St>,
    St: Send + Sync,
{
    type Rejection = BridgeError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &St,
    ) -> Result<Option<Self>, Self::Rejection> {
        SessionAccess::from_ref(state).resolve(parts).await
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for SessionStore (needed for Arc<dyn>).
pub(super) trait SessionStoreDyn: Send + Sync {
    fn find_dyn<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Option<Session>, StoreError>>;
}

impl<T: SessionStore> SessionStoreDyn for T {
    fn find_dyn<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Option<Session>, StoreError>> {
        Box::pin(self.find(session_id))
    }
}
