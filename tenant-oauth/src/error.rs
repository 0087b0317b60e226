use crate::token::Principal;
use serde::Deserialize;
use thiserror::Error;

/// Invalid or incomplete credential configuration, detected at construction time
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid URL for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("{field} is {value}, expected {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// The identity provider rejected or failed an authorization code or refresh exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Token endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token endpoint rejected the request (status {status}): {error}{}", .description.as_deref().map(|d| format!(" - {d}")).unwrap_or_default())]
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },
    #[error("Token endpoint returned an unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Token has no refresh credential")]
    MissingRefreshToken,
}

/// Failures reported by a token store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No session stored for principal '{0}'")]
    SessionNotFound(Principal),
    #[error("Token store backend error: {0}")]
    Backend(String),
}

/// Error body returned by the remote API for unsuccessful calls.
///
/// Bodies that do not decode into this shape are replaced by [`ApiError::unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
#[serde(rename_all = "PascalCase")]
#[error("{title} (status {status}): {detail}")]
pub struct ApiError {
    pub title: String,
    pub status: u16,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub instance: String,
}

impl ApiError {
    /// Fallback used when the error body cannot be decoded
    pub fn unknown() -> Self {
        Self {
            title: "Unknown error".to_string(),
            status: 500,
            detail: "Error decoding the API error response".to_string(),
            instance: String::new(),
        }
    }

    /// Decode an API error body, falling back to [`ApiError::unknown`]
    pub fn decode(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_else(|_| Self::unknown())
    }
}

/// Errors surfaced by the token pipeline and the clients it assembles
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Token exchange failed: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("Failed to persist refreshed token: {0}")]
    Persistence(#[source] StoreError),
    #[error("Failed to load session: {0}")]
    Store(#[source] StoreError),
    #[error("No session stored for principal '{0}'")]
    SessionNotFound(Principal),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("Token refresh task failed: {0}")]
    RefreshTask(#[from] tokio::task::JoinError),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Operation timed out")]
    Timeout,
}
