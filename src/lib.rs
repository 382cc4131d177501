#![doc = include_str!("../README.md")]

pub mod audit;
#[cfg(feature = "issuer")]
pub mod client;
pub mod clock;
pub mod error;
pub mod issuer;
pub mod login_redirect;
pub mod logout;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod provisioning;
pub mod secret;
pub mod session;
pub mod store;
pub mod token;
pub mod types;
pub mod validator;

// Re-exports for convenient access
pub use audit::{AuditEvent, AuditKind, AuditLog, TracingAuditLog};
#[cfg(feature = "issuer")]
pub use client::SatelliteClient;
pub use clock::{Clock, SystemClock};
pub use error::{Error, FormatError, ProvisioningError, StoreError, TokenError};
pub use issuer::TokenIssuer;
pub use login_redirect::{ClientInfo, LoginRedirectHandler, LoginRedirectSettings};
pub use logout::SessionTerminator;
pub use provisioning::UserProvisioningService;
pub use secret::{SecretProvider, SharedSecret};
pub use session::{
    CookieInstruction, MemorySessionStore, NewSession, RedirectInstruction, RedirectTarget,
    Session, SessionCookieSettings, SessionStore,
};
pub use store::{MemoryUserStore, UserStore};
pub use types::{Claims, SessionId, SubjectId, UserId, UserProfile, UserRecord};
pub use validator::{FreshnessRules, TokenValidator};
