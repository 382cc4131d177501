use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use time::Duration;
use url::Url;

use super::extractor::SessionAccess;
use crate::audit::{AuditLog, TracingAuditLog};
use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::issuer::TokenIssuer;
use crate::provisioning::DEFAULT_LOCALE;
use crate::secret::{SecretProvider, SharedSecret};
use crate::session::{DEFAULT_SESSION_COOKIE, RedirectTarget, SessionCookieSettings, SessionStore};
use crate::validator::{DEFAULT_FUTURE_SKEW, DEFAULT_WINDOW, FreshnessRules};

/// Shared bridge settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct BridgeSettings {
    pub(crate) cookie_key: Key,
    pub(crate) cookie: SessionCookieSettings,
    pub(crate) auth_path: String,
    pub(crate) landing: RedirectTarget,
    pub(crate) login: RedirectTarget,
    pub(crate) rules: FreshnessRules,
    pub(crate) default_locale: String,
}

impl BridgeSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            cookie: SessionCookieSettings::default(),
            auth_path: "/auth".into(),
            landing: RedirectTarget::Local("/".into()),
            login: RedirectTarget::Local("/user/login".into()),
            rules: FreshnessRules::default(),
            default_locale: DEFAULT_LOCALE.into(),
        }
    }
}

/// Bridge configuration for one site.
///
/// Required fields (shared secret, peer URL) are constructor parameters.
///
/// Use [`from_env()`](BridgeConfig::from_env) for convention-based setup,
/// or [`new()`](BridgeConfig::new) with `with_*` methods for full control.
pub struct BridgeConfig {
    pub(super) secret: Arc<dyn SecretProvider>,
    pub(super) peer_url: Url,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) audit: Arc<dyn AuditLog>,
    pub(super) settings: BridgeSettings,
}

impl BridgeConfig {
    /// `peer_url` is where logout sends the browser: the centralized site's
    /// logout route on a satellite, the login page on the centralized site.
    #[must_use]
    pub fn new(secret: impl SecretProvider, peer_url: Url) -> Self {
        Self {
            secret: Arc::new(secret),
            peer_url,
            clock: Arc::new(SystemClock),
            audit: Arc::new(TracingAuditLog),
            settings: BridgeSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `BRIDGE_SHARED_SECRET`: HMAC secret shared by both sites
    /// - `BRIDGE_PEER_URL`: logout redirect target (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `BRIDGE_TOKEN_WINDOW_SECS`: credential lifetime (default 300)
    /// - `BRIDGE_FUTURE_SKEW_SECS`: tolerated clock skew (default 30)
    /// - `BRIDGE_SESSION_COOKIE`: session cookie name
    /// - `BRIDGE_DEFAULT_LOCALE`: locale for new accounts (default `en`)
    /// - `DEV_AUTH`: Set to `"1"` or `"true"` to drop `Secure` from the session cookie
    /// - `COOKIE_KEY`: Cookie encryption key bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        let secret = SharedSecret::from_env_var("BRIDGE_SHARED_SECRET")?;
        let peer_url: Url = std::env::var("BRIDGE_PEER_URL")
            .map_err(|_| Error::Config("BRIDGE_PEER_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("BRIDGE_PEER_URL: {e}")))?;

        let rules = FreshnessRules {
            window: env_seconds("BRIDGE_TOKEN_WINDOW_SECS", DEFAULT_WINDOW)?,
            future_skew: env_seconds("BRIDGE_FUTURE_SKEW_SECS", DEFAULT_FUTURE_SKEW)?,
        };

        let dev_auth = matches!(
            std::env::var("DEV_AUTH").as_deref(),
            Ok("1") | Ok("true"),
        );

        let cookie_key = match std::env::var("COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                Error::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => Key::generate(),
        };

        let mut config = Self::new(secret, peer_url)
            .with_cookie_key(cookie_key)
            .with_freshness_rules(rules)
            .with_secure_cookies(!dev_auth);

        if let Ok(name) = std::env::var("BRIDGE_SESSION_COOKIE") {
            config = config.with_session_cookie_name(name);
        }
        if let Ok(locale) = std::env::var("BRIDGE_DEFAULT_LOCALE") {
            config = config.with_default_locale(locale);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.cookie.name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.settings.cookie.ttl = ttl;
        self
    }

    /// `Secure` on the session cookie. The logout cookie is secure regardless.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.cookie.secure = secure;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Where a successful login-redirect lands.
    #[must_use]
    pub fn with_landing(mut self, target: RedirectTarget) -> Self {
        self.settings.landing = target;
        self
    }

    /// Where every failed login-redirect lands.
    #[must_use]
    pub fn with_login_page(mut self, target: RedirectTarget) -> Self {
        self.settings.login = target;
        self
    }

    #[must_use]
    pub fn with_freshness_rules(mut self, rules: FreshnessRules) -> Self {
        self.settings.rules = rules;
        self
    }

    #[must_use]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.settings.default_locale = locale.into();
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn session_cookie_name(&self) -> &str {
        &self.settings.cookie.name
    }

    /// Issuer sharing this config's secret and clock, for the centralized
    /// site's side of the bridge.
    #[must_use]
    pub fn token_issuer(&self) -> TokenIssuer {
        TokenIssuer::new(self.secret.clone(), self.clock.clone())
    }

    /// Lookup context for the [`SessionUser`](super::SessionUser) extractor in
    /// the application's own routes.
    #[must_use]
    pub fn session_access<S: SessionStore>(&self, sessions: Arc<S>) -> SessionAccess {
        SessionAccess::new(
            sessions,
            self.settings.cookie.name.clone(),
            self.settings.cookie_key.clone(),
        )
    }
}

fn env_seconds(var: &str, default: Duration) -> Result<Duration, Error> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(default);
    };
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{var}: {e}")))?;
    if secs < 0 {
        return Err(Error::Config(format!("{var} must not be negative")));
    }
    Ok(Duration::seconds(secs))
}
