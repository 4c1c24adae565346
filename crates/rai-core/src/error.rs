//! Error taxonomy for the session and push core
//!
//! Every failure is recovered at the boundary of the user action that
//! triggered it and turned into one message via [`CoreError::user_message`].

use serde::Deserialize;
use thiserror::Error;

/// Result alias used across the core
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Failures surfaced by the core.
///
/// `Clone` so that one refresh outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The host cannot run the push flow (insecure context, missing APIs)
    #[error("{0}")]
    EnvironmentUnsupported(String),

    /// The user did not grant notification permission
    #[error("Notification permission was not granted")]
    PermissionDenied,

    /// The server has no usable push public key
    #[error("Server is not configured for push: {0}")]
    ServerMisconfigured(String),

    /// Access credential rejected and the refresh failed too; session cleared
    #[error("Session expired, please sign in again")]
    AuthFailure,

    /// Transport-level failure (DNS, refused connection, offline)
    #[error("Network error: {0}")]
    NetworkFailure(String),

    /// Non-success response from the backend
    #[error("{message}")]
    ServerRejected { status: u16, message: String },

    /// Success status but a body we could not decode
    #[error("Unexpected server response: {0}")]
    UnexpectedResponse(String),

    /// Push event body was not valid JSON; recovered by the worker
    #[error("Malformed push payload: {0}")]
    PayloadMalformed(String),

    /// Session storage could not be read or written
    #[error("Session storage error: {0}")]
    Storage(String),

    /// The caller built a request we cannot send
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The background worker runtime has shut down
    #[error("Background worker is not running")]
    WorkerStopped,
}

impl CoreError {
    /// The single message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::EnvironmentUnsupported(reason) => reason.clone(),
            Self::PermissionDenied => "Notification access was not granted".to_string(),
            Self::ServerMisconfigured(_) => {
                "Push public key is not configured on the server".to_string()
            }
            Self::AuthFailure => "Please sign in again".to_string(),
            Self::NetworkFailure(_) => "Network error, please try again".to_string(),
            Self::ServerRejected { message, .. } => message.clone(),
            Self::UnexpectedResponse(_) => "The server sent an unexpected response".to_string(),
            Self::PayloadMalformed(_) => "Received a malformed notification".to_string(),
            Self::Storage(_) => "Could not save session data".to_string(),
            Self::InvalidRequest(detail) => detail.clone(),
            Self::WorkerStopped => "Notifications are unavailable right now".to_string(),
        }
    }

    /// Whether trying the same action again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }

    /// Whether the user has to sign in again.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Self::AuthFailure)
    }

    /// HTTP status carried by a server rejection
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::UnexpectedResponse(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}

/// Error body shapes returned by the backend.
///
/// Handlers answer `{"error": ...}`; framework-level auth failures answer
/// `{"detail": ...}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Build a [`CoreError::ServerRejected`] from a non-success response,
/// using the server's message verbatim when present.
pub(crate) async fn rejection(response: reqwest::Response, fallback: &str) -> CoreError {
    let status = response.status().as_u16();
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    let message = body
        .error
        .or(body.detail)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());

    tracing::debug!(status, %message, "Server rejected request");
    CoreError::ServerRejected { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_retryable() {
        assert!(CoreError::NetworkFailure("offline".into()).is_retryable());
        assert!(!CoreError::AuthFailure.is_retryable());
        assert!(!CoreError::ServerRejected {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn server_message_is_shown_verbatim() {
        let err = CoreError::ServerRejected {
            status: 400,
            message: "Username cannot be empty".into(),
        };
        assert_eq!(err.user_message(), "Username cannot be empty");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn auth_failure_asks_for_sign_in() {
        assert!(CoreError::AuthFailure.requires_sign_in());
        assert_eq!(CoreError::AuthFailure.user_message(), "Please sign in again");
    }

    #[test]
    fn environment_reason_is_user_facing() {
        let err = CoreError::EnvironmentUnsupported("Push requires HTTPS or localhost".into());
        assert_eq!(err.user_message(), "Push requires HTTPS or localhost");
    }
}
