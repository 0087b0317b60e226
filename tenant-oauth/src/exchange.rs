//! Authorization code and refresh token exchange against the identity provider

use crate::config::CredentialConfig;
use crate::error::{ConfigError, ExchangeError};
use crate::token::Token;
use chrono::{Duration, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Converts authorization codes and refresh credentials into tokens.
///
/// Each call is a single round-trip to the token endpoint; implementations hold no
/// per-session state. Cancellation is handled by dropping the returned future.
#[async_trait::async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange an authorization code received on the redirect callback
    async fn exchange_code(&self, code: &str) -> Result<Token, ExchangeError>;

    /// Obtain a replacement token with a refresh credential
    async fn refresh(&self, refresh_token: &str) -> Result<Token, ExchangeError>;
}

/// Successful token endpoint answer
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self) -> Token {
        let expiry = self.expires_in.filter(|seconds| *seconds > 0).and_then(|seconds| {
            let expiry = Duration::try_seconds(seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
            if expiry.is_none() {
                warn!(
                    "Ignoring out of range expires_in {}, token treated as non-expiring",
                    seconds
                );
            }
            expiry
        });
        Token {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_default(),
            refresh_token: self.refresh_token.unwrap_or_default(),
            expiry,
        }
    }
}

/// Error body defined by RFC 6749 section 5.2
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 client for one identity provider
#[derive(Clone)]
pub struct Provider {
    config: Arc<CredentialConfig>,
    client: Client,
    auth_url: Url,
    token_url: Url,
}

impl Provider {
    /// Create a provider with a dedicated HTTP client bounded by the exchange timeout
    pub fn new(config: Arc<CredentialConfig>) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.exchange_timeout())
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(ConfigError::HttpClient)?;
        Self::with_client(config, client)
    }

    /// Create a provider reusing an existing HTTP client
    pub fn with_client(config: Arc<CredentialConfig>, client: Client) -> Result<Self, ConfigError> {
        config.validate()?;
        let auth_url = Url::parse(&config.auth_url).map_err(|source| ConfigError::InvalidUrl {
            field: "auth_url",
            source,
        })?;
        let token_url =
            Url::parse(&config.token_url).map_err(|source| ConfigError::InvalidUrl {
                field: "token_url",
                source,
            })?;
        Ok(Self {
            config,
            client,
            auth_url,
            token_url,
        })
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// URL to redirect a user to in order to start the authorization code flow
    pub fn authorize_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.get_scopes().join(" "))
            .append_pair("state", state);
        url.into()
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<Token, ExchangeError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(http::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (error, description) = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(parsed) => (parsed.error, parsed.error_description),
                Err(_) => (
                    "unknown_error".to_string(),
                    Some(body).filter(|b| !b.is_empty()),
                ),
            };
            warn!("Token endpoint returned {}: {}", status, error);
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                error,
                description,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(format!("JSON parse error: {e}")))?;
        if parsed.access_token.is_empty() {
            return Err(ExchangeError::InvalidResponse(
                "response has no access_token".to_string(),
            ));
        }
        Ok(parsed.into_token())
    }
}

#[async_trait::async_trait]
impl TokenExchange for Provider {
    async fn exchange_code(&self, code: &str) -> Result<Token, ExchangeError> {
        debug!("Exchanging authorization code at {}", self.token_url);
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, ExchangeError> {
        if refresh_token.is_empty() {
            return Err(ExchangeError::MissingRefreshToken);
        }
        debug!("Refreshing token at {}", self.token_url);
        let mut token = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        // Providers that do not rotate refresh credentials omit them from the answer
        if token.refresh_token.is_empty() {
            token.refresh_token = refresh_token.to_string();
        }
        Ok(token)
    }
}
