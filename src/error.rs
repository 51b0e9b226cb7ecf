use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::outcome::WebhookResponse;

/// Error type for webhook processing.
///
/// Only some variants are incidents. `UnsupportedEvent`, `IgnoredAction`,
/// `NotListening`, `NoChanges` and `NoSubfolders` describe deliveries that are
/// valid but require no work; see [`WebhookError::is_no_action`].
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("No X-Hub-Signature in HTTP header.")]
    MissingSignature,

    #[error("Message signature is invalid.")]
    InvalidSignature,

    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("I do not handle {0} events")]
    UnsupportedEvent(String),

    #[error("I do not handle {event} {action} events")]
    IgnoredAction { event: String, action: String },

    #[error("Not listening on branch {branch_ref}.")]
    NotListening { branch_ref: String },

    #[error("No files have been touched in commit.")]
    NoChanges,

    #[error("No subfolders found.")]
    NoSubfolders,

    #[error("Upstream service failed: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl WebhookError {
    /// Returns true for the expected business conditions that end a delivery
    /// without starting anything. These are not incidents.
    pub fn is_no_action(&self) -> bool {
        matches!(
            self,
            WebhookError::UnsupportedEvent(_)
                | WebhookError::IgnoredAction { .. }
                | WebhookError::NotListening { .. }
                | WebhookError::NoChanges
                | WebhookError::NoSubfolders
        )
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature | WebhookError::InvalidSignature
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::MissingHeader(_) | WebhookError::MalformedPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            e if e.is_no_action() => StatusCode::ACCEPTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        WebhookError::Upstream(e.to_string())
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        WebhookResponse::from_error(&self, None).into_response()
    }
}

/// Helper type for Results that use WebhookError
pub type Result<T> = std::result::Result<T, WebhookError>;
