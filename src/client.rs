use std::sync::Arc;

use url::Url;

use crate::clock::SystemClock;
use crate::error::Error;
use crate::issuer::TokenIssuer;
use crate::secret::SharedSecret;
use crate::types::{LoginRequest, LoginResponse, SubjectId, UserId, UserProfile};

/// Centralized-site client for one satellite.
///
/// ```rust,ignore
/// let client = SatelliteClient::from_env()?;
/// let url = client.bridge_login(&central_user_id, &profile).await?;
/// // Redirect the browser to `url`.
/// ```
pub struct SatelliteClient {
    target: Url,
    issuer: TokenIssuer,
    http: reqwest::Client,
}

impl SatelliteClient {
    /// `target` is the satellite's base URL, e.g. `https://shop.example.com/`.
    #[must_use]
    pub fn new(target: Url, issuer: TokenIssuer) -> Self {
        Self {
            target,
            issuer,
            http: reqwest::Client::new(),
        }
    }

    /// Create a client from environment variables.
    ///
    /// # Required env vars
    /// - `BRIDGE_TARGET_SITE_URL`: satellite base URL
    /// - `BRIDGE_SHARED_SECRET`: HMAC secret shared with the satellite
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let target: Url = std::env::var("BRIDGE_TARGET_SITE_URL")
            .map_err(|_| Error::Config("BRIDGE_TARGET_SITE_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("BRIDGE_TARGET_SITE_URL: {e}")))?;
        let secret = SharedSecret::from_env_var("BRIDGE_SHARED_SECRET")?;

        Ok(Self::new(
            target,
            TokenIssuer::new(Arc::new(secret), Arc::new(SystemClock)),
        ))
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Provision `profile` on the satellite, asserting `subject` (the
    /// centralized site's user id). Returns the satellite's local user id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, [`Error::Peer`] if the
    /// satellite rejects the request.
    pub async fn provision(&self, subject: &SubjectId, profile: &UserProfile) -> Result<UserId, Error> {
        let token = self.issuer.issue(subject.as_str())?;
        let url = self.endpoint("auth/login")?;

        let response = self
            .http
            .post(url)
            .json(&LoginRequest::new(token, profile))
            .send()
            .await?;

        let response = Self::ensure_success(response, "provisioning").await?;
        let body = response.json::<LoginResponse>().await?;
        tracing::debug!(uid = %body.uid, "Satellite provisioned account");
        Ok(body.uid)
    }

    /// URL of the satellite's login-redirect endpoint carrying a fresh
    /// handoff credential for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the id cannot be encoded.
    pub fn login_redirect_url(&self, user_id: &UserId) -> Result<Url, Error> {
        let handoff = self.issuer.issue_handoff(user_id.as_str())?;
        let mut url = self.endpoint("auth/login-redirect")?;
        url.query_pairs_mut().append_pair("token", &handoff);
        Ok(url)
    }

    /// Provision and return where to send the browser.
    ///
    /// # Errors
    ///
    /// See [`provision`](Self::provision).
    pub async fn bridge_login(&self, subject: &SubjectId, profile: &UserProfile) -> Result<Url, Error> {
        let uid = self.provision(subject, profile).await?;
        self.login_redirect_url(&uid)
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        // Keep any base path the satellite is mounted under.
        let mut base = self.target.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path)
            .map_err(|e| Error::Config(format!("target site URL: {e}")))
    }

    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::Peer {
            operation,
            status: Some(status),
            detail,
        })
    }
}
