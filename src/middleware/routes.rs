use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header::USER_AGENT};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;

use super::config::{BridgeConfig, BridgeSettings};
use super::cookies;
use super::error::BridgeError;
use super::state::{LogoutState, SatelliteState};
use crate::clock::Clock;
use crate::login_redirect::{ClientInfo, LoginRedirectHandler, LoginRedirectSettings};
use crate::logout::SessionTerminator;
use crate::provisioning::UserProvisioningService;
use crate::session::SessionStore;
use crate::store::UserStore;
use crate::types::{LoginRequest, LoginResponse, SessionId};
use crate::validator::TokenValidator;

/// Create the satellite router: provisioning, login-redirect and logout.
///
/// Routes, relative to the configured auth path (default `/auth`):
/// - `POST /login` provisions the asserted account and returns `{"uid": ..}`
/// - `GET /login-redirect?token=..` starts a session from a handoff credential
/// - `GET|POST /logout` ends the local session and redirects to the peer URL
pub fn satellite_routes<U, S>(config: BridgeConfig, user_store: Arc<U>, session_store: Arc<S>) -> Router
where
    U: UserStore,
    S: SessionStore,
{
    let BridgeConfig {
        secret,
        peer_url,
        clock,
        audit,
        settings,
    } = config;

    let validator =
        TokenValidator::new(secret, clock.clone(), audit.clone()).with_rules(settings.rules);

    let provisioning = UserProvisioningService::new(user_store.clone(), audit.clone())
        .with_default_locale(settings.default_locale.clone())
        .with_clock(clock.clone());

    let redirect_handler = LoginRedirectHandler::new(
        validator.clone(),
        user_store,
        session_store.clone(),
        audit,
        clock.clone(),
        LoginRedirectSettings {
            cookie: settings.cookie.clone(),
            landing: settings.landing.clone(),
            login: settings.login.clone(),
        },
    );

    let auth_path = settings.auth_path.clone();
    let state = SatelliteState {
        validator,
        provisioning: Arc::new(provisioning),
        login_redirect: Arc::new(redirect_handler),
        logout: logout_state(&settings, session_store, clock, peer_url),
    };

    Router::new()
        .route(&format!("{auth_path}/login"), post(login::<U, S>))
        .route(&format!("{auth_path}/login-redirect"), get(login_redirect::<U, S>))
        .route(
            &format!("{auth_path}/logout"),
            get(logout::<S>).post(logout::<S>),
        )
        .with_state(state)
}

/// Create the centralized-site router: logout only.
///
/// Credentials on this side are minted with
/// [`BridgeConfig::token_issuer`] or a [`SatelliteClient`](crate::client::SatelliteClient).
pub fn central_routes<S: SessionStore>(config: BridgeConfig, session_store: Arc<S>) -> Router {
    let BridgeConfig {
        peer_url,
        clock,
        settings,
        ..
    } = config;

    let auth_path = settings.auth_path.clone();
    let state = logout_state(&settings, session_store, clock, peer_url);

    Router::new()
        .route(
            &format!("{auth_path}/logout"),
            get(logout::<S>).post(logout::<S>),
        )
        .with_state(state)
}

fn logout_state<S: SessionStore>(
    settings: &BridgeSettings,
    session_store: Arc<S>,
    clock: Arc<dyn Clock>,
    peer_url: url::Url,
) -> LogoutState<S> {
    LogoutState {
        terminator: Arc::new(SessionTerminator::new(
            session_store,
            clock,
            settings.cookie.name.clone(),
            peer_url,
        )),
        cookie_key: settings.cookie_key.clone(),
        cookie_name: settings.cookie.name.clone(),
    }
}

// ── Login (provisioning) ───────────────────────────────────────────

async fn login<U: UserStore, S: SessionStore>(
    State(state): State<SatelliteState<U, S>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, BridgeError> {
    let Json(request) = body.map_err(|e| BridgeError::InvalidBody(e.body_text()))?;

    // Token first: an invalid credential is 403 even when fields are missing.
    let claims = state.validator.validate(&request.token)?;
    let uid = state.provisioning.provision(&request.profile()).await?;

    tracing::info!(uid = %uid, issued_at = claims.issued_at, "Bridged account provisioned");

    Ok(Json(LoginResponse { uid }))
}

// ── Login redirect (handoff) ───────────────────────────────────────

#[derive(Deserialize)]
struct LoginRedirectParams {
    token: Option<String>,
}

async fn login_redirect<U: UserStore, S: SessionStore>(
    State(state): State<SatelliteState<U, S>>,
    jar: PrivateCookieJar,
    params: Result<Query<LoginRedirectParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let token = params.ok().and_then(|Query(p)| p.token);
    let client = ClientInfo {
        user_agent: extract_user_agent(&headers),
        ip_address: extract_client_ip(&headers),
    };

    let instruction = state
        .login_redirect
        .finalize(token.as_deref(), client)
        .await;

    cookies::redirect_response(jar, instruction)
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<S: SessionStore>(
    State(state): State<LogoutState<S>>,
    jar: PrivateCookieJar,
) -> Response {
    let current = jar
        .get(&state.cookie_name)
        .map(|c| SessionId(c.value().to_string()));

    let instruction = state.terminator.logout(current.as_ref()).await;
    cookies::redirect_response(jar, instruction)
}

// ── Helpers ────────────────────────────────────────────────────────

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
}
