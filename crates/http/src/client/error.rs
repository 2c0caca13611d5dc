//! Client error types

use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure or timeout; never enters the refresh flow
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The session could not be refreshed and has been cleared
    #[error("Session expired, please log in again")]
    AuthExpired,

    /// Server returned a non-success status
    #[error("Server error {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Build a [`ClientError::RequestFailed`] from a rejected response, keeping
    /// the body verbatim
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::RequestFailed {
            status: status.as_u16(),
            body,
        }
    }

    /// HTTP status carried by the error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the session was terminated and the caller should stop retrying
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Whether the failure happened below HTTP (connect, timeout, TLS)
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RequestFailed { status: 404, .. })
    }

    /// Error payload parsed as JSON, for rendering field-level validation errors
    pub fn json_body(&self) -> Option<serde_json::Value> {
        match self {
            Self::RequestFailed { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}
