use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::login_redirect::LoginRedirectHandler;
use crate::logout::SessionTerminator;
use crate::provisioning::UserProvisioningService;
use crate::session::SessionStore;
use crate::validator::TokenValidator;

/// State for the logout route, mounted on both sides of the bridge.
pub(super) struct LogoutState<S> {
    pub(super) terminator: Arc<SessionTerminator<S>>,
    pub(super) cookie_key: Key,
    pub(super) cookie_name: String,
}

/// State for the satellite routes.
pub(super) struct SatelliteState<U, S> {
    pub(super) validator: TokenValidator,
    pub(super) provisioning: Arc<UserProvisioningService<U>>,
    pub(super) login_redirect: Arc<LoginRedirectHandler<U, S>>,
    pub(super) logout: LogoutState<S>,
}

// Manual Clone: avoid derive adding `U: Clone, S: Clone` bounds.
impl<S> Clone for LogoutState<S> {
    fn clone(&self) -> Self {
        Self {
            terminator: self.terminator.clone(),
            cookie_key: self.cookie_key.clone(),
            cookie_name: self.cookie_name.clone(),
        }
    }
}

impl<U, S> Clone for SatelliteState<U, S> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
            provisioning: self.provisioning.clone(),
            login_redirect: self.login_redirect.clone(),
            logout: self.logout.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<S: SessionStore> FromRef<LogoutState<S>> for Key {
    fn from_ref(state: &LogoutState<S>) -> Self {
        state.cookie_key.clone()
    }
}

impl<U, S: SessionStore> FromRef<SatelliteState<U, S>> for Key {
    fn from_ref(state: &SatelliteState<U, S>) -> Self {
        state.logout.cookie_key.clone()
    }
}

impl<U, S: SessionStore> FromRef<SatelliteState<U, S>> for LogoutState<S> {
    fn from_ref(state: &SatelliteState<U, S>) -> Self {
        state.logout.clone()
    }
}
