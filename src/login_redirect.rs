use std::sync::Arc;

use crate::audit::{AuditEvent, AuditKind, AuditLog};
use crate::clock::Clock;
use crate::session::{
    CookieInstruction, NewSession, RedirectInstruction, RedirectTarget, SessionCookieSettings,
    SessionStore,
};
use crate::store::UserStore;
use crate::token::CredentialKind;
use crate::types::UserId;
use crate::validator::TokenValidator;

/// Client details recorded on the new session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Where [`LoginRedirectHandler`] sends the browser and which cookie it sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirectSettings {
    pub cookie: SessionCookieSettings,
    /// Authenticated entry point.
    pub landing: RedirectTarget,
    /// Fallback for every failure.
    pub login: RedirectTarget,
}

/// Second leg of a bridged login: turns a handoff credential into a session.
///
/// The handoff credential carries the local user id returned by provisioning
/// and is signed with the handoff key, so provisioning credentials are not
/// accepted here. A bare id is never trusted.
/// Every failure ends on the login page rather than an error page.
pub struct LoginRedirectHandler<U, S> {
    validator: TokenValidator,
    users: Arc<U>,
    sessions: Arc<S>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    settings: LoginRedirectSettings,
}

impl<U: UserStore, S: SessionStore> LoginRedirectHandler<U, S> {
    /// `validator` is switched to [`CredentialKind::Handoff`].
    #[must_use]
    pub fn new(
        validator: TokenValidator,
        users: Arc<U>,
        sessions: Arc<S>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        settings: LoginRedirectSettings,
    ) -> Self {
        Self {
            validator: validator.for_kind(CredentialKind::Handoff),
            users,
            sessions,
            audit,
            clock,
            settings,
        }
    }

    /// Validates `handoff`, starts a session for its subject and redirects to
    /// the landing page; otherwise redirects to the login page.
    pub async fn finalize(&self, handoff: Option<&str>, client: ClientInfo) -> RedirectInstruction {
        let Some(raw) = handoff.filter(|t| !t.is_empty()) else {
            tracing::debug!("Login redirect without handoff credential");
            return self.to_login();
        };

        // Rejections are audited by the validator.
        let Ok(claims) = self.validator.validate(raw) else {
            return self.to_login();
        };

        let user_id = UserId(claims.subject_id.0);
        let user = match self.users.find_by_id(&user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.audit.record(
                    AuditEvent::new(AuditKind::UserNotFound, self.clock.now())
                        .with_subject(user_id.as_str()),
                );
                return self.to_login();
            }
            Err(e) => {
                tracing::error!(error = %e, "User lookup failed during login redirect");
                return self.to_login();
            }
        };

        let now = self.clock.now();
        let session = NewSession {
            user_id: user.id.clone(),
            expires_at: now + self.settings.cookie.ttl,
            user_agent: client.user_agent,
            ip_address: client.ip_address,
        };

        match self.sessions.create(session).await {
            Ok(session_id) => {
                tracing::info!(user_id = %user.id, "Bridged login finalized");
                RedirectInstruction::to(self.settings.landing.clone()).with_cookie(
                    CookieInstruction::session(&self.settings.cookie, &session_id, now),
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "Session creation failed");
                self.to_login()
            }
        }
    }

    fn to_login(&self) -> RedirectInstruction {
        RedirectInstruction::to(self.settings.login.clone())
    }
}
