use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Reasons a webhook delivery is refused before it reaches the handler
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing webhook signature header")]
    MissingSignature,
    #[error("Webhook signature mismatch")]
    SignatureMismatch,
    #[error("Webhook body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("Failed to read webhook body: {0}")]
    Body(String),
    #[error("Invalid signing key")]
    InvalidKey,
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature | WebhookError::SignatureMismatch => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            WebhookError::Body(_) | WebhookError::InvalidKey => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "detail": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Invalid webhook verifier configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}
