use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{ProvisioningError, StoreError, TokenError};

/// Errors surfaced by the bridge's JSON endpoints and extractor.
///
/// Response bodies are generic; details only reach the log.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Credential rejected (details are in the audit log).
    #[error("Invalid token")]
    InvalidToken(#[from] TokenError),

    /// Email or username absent or blank.
    #[error("Missing required user details")]
    MissingUserDetails,

    /// Body is not a JSON object of the expected shape. Answered like
    /// missing details; the rejection text only reaches the log.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// No valid session found.
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Provisioning failed: {0}")]
    Provisioning(ProvisioningError),

    /// Session or user store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ProvisioningError> for BridgeError {
    fn from(e: ProvisioningError) -> Self {
        match e {
            ProvisioningError::MissingField(_) => Self::MissingUserDetails,
            other => Self::Provisioning(other),
        }
    }
}

impl BridgeError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken(_) => StatusCode::FORBIDDEN,
            Self::MissingUserDetails | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Provisioning(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::InvalidToken(_) => "Invalid token",
            Self::MissingUserDetails => "Missing required user details",
            Self::InvalidBody(reason) => {
                tracing::debug!(reason = %reason, "Unreadable login body");
                "Missing required user details"
            }
            Self::Unauthenticated => "Not authenticated",
            Self::Provisioning(_) | Self::Store(_) => {
                tracing::error!(error = %self, "Bridge internal error");
                "Internal error"
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
