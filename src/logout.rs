use std::sync::Arc;

use url::Url;

use crate::clock::Clock;
use crate::session::{CookieInstruction, RedirectInstruction, RedirectTarget, SessionStore};
use crate::types::SessionId;

/// Local logout followed by a trusted redirect to the peer site.
///
/// Which peer endpoint to target is deployment configuration: the centralized
/// site usually sends the browser to its own login page, a satellite to the
/// centralized site's logout route so the identity session ends as well.
pub struct SessionTerminator<S> {
    sessions: Arc<S>,
    clock: Arc<dyn Clock>,
    cookie_name: String,
    peer_url: Url,
}

impl<S: SessionStore> SessionTerminator<S> {
    #[must_use]
    pub fn new(sessions: Arc<S>, clock: Arc<dyn Clock>, cookie_name: impl Into<String>, peer_url: Url) -> Self {
        Self {
            sessions,
            clock,
            cookie_name: cookie_name.into(),
            peer_url,
        }
    }

    #[must_use]
    pub fn peer_url(&self) -> &Url {
        &self.peer_url
    }

    /// Ends the current session (if any) and returns the redirect to the peer.
    ///
    /// The expiring cookie is emitted even when no session was found, so a
    /// stale cookie is always cleared. A store failure is logged and does not
    /// keep the browser logged in.
    pub async fn logout(&self, current: Option<&SessionId>) -> RedirectInstruction {
        if let Some(session_id) = current {
            match self.sessions.delete(session_id).await {
                Ok(()) => tracing::info!("Local session terminated"),
                Err(e) => tracing::warn!(error = %e, "Session deletion failed during logout"),
            }
        }

        let now = self.clock.now();
        RedirectInstruction::to(RedirectTarget::Trusted(self.peer_url.clone()))
            .with_cookie(CookieInstruction::expire(&self.cookie_name, now))
    }
}
