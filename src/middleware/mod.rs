//! Axum routes for both sides of the bridge.
//!
//! # Quick Start (satellite)
//!
//! ```rust,ignore
//! use site_auth_bridge::middleware::{BridgeConfig, SessionUser, satellite_routes};
//!
//! // 1. Implement UserStore and SessionStore for your app (or use the memory stores)
//! // 2. Configure from environment
//! let config = BridgeConfig::from_env()?;
//! let access = config.session_access(sessions.clone());
//!
//! // 3. Mount bridge routes next to your own
//! let app = axum::Router::new()
//!     .route("/me", get(|user: SessionUser| async move { user.user_id.to_string() }))
//!     .with_state(access)
//!     .merge(satellite_routes(config, users, sessions));
//! ```
//!
//! The centralized site mounts [`central_routes`] and mints credentials with
//! [`BridgeConfig::token_issuer`].

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use extractor::{SessionAccess, SessionUser};
pub use routes::{central_routes, satellite_routes};

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
