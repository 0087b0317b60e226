//! OAuth2 client credential configuration

use crate::error::ConfigError;
use confique::Config;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Largest accepted `clock_skew`, in seconds
pub const MAX_CLOCK_SKEW_SECS: u64 = 86_400;
/// Largest accepted `exchange_timeout`, in seconds
pub const MAX_EXCHANGE_TIMEOUT_SECS: u64 = 3_600;
/// Largest accepted `refresher_idle`, in seconds
pub const MAX_REFRESHER_IDLE_SECS: u64 = 30 * 86_400;

/// Client credentials and identity provider endpoints.
///
/// Loaded once at startup and shared immutably (usually behind an `Arc`).
#[derive(Config, Clone)]
pub struct CredentialConfig {
    /// OAuth2 client identifier
    #[config(env = "TENANT_OAUTH_CLIENT_ID")]
    pub client_id: String,

    /// OAuth2 client secret
    #[config(env = "TENANT_OAUTH_CLIENT_SECRET")]
    pub client_secret: String,

    /// Requested scopes, comma-separated (default: "offline_access")
    #[config(env = "TENANT_OAUTH_SCOPES", default = "offline_access")]
    pub scopes: String,

    /// Redirect target registered with the identity provider
    #[config(env = "TENANT_OAUTH_REDIRECT_URL")]
    pub redirect_url: String,

    /// Identity provider authorize endpoint
    #[config(
        env = "TENANT_OAUTH_AUTH_URL",
        default = "https://login.xero.com/identity/connect/authorize"
    )]
    pub auth_url: String,

    /// Identity provider token endpoint
    #[config(
        env = "TENANT_OAUTH_TOKEN_URL",
        default = "https://identity.xero.com/connect/token"
    )]
    pub token_url: String,

    /// Endpoint listing the tenants connected to a session
    #[config(
        env = "TENANT_OAUTH_CONNECTIONS_URL",
        default = "https://api.xero.com/connections"
    )]
    pub connections_url: String,

    /// Seconds before expiry at which a token is already considered expired (default: 10)
    #[config(env = "TENANT_OAUTH_CLOCK_SKEW", default = 10)]
    pub clock_skew: u64,

    /// Timeout in seconds for token endpoint and token store calls (default: 30)
    #[config(env = "TENANT_OAUTH_EXCHANGE_TIMEOUT", default = 30)]
    pub exchange_timeout: u64,

    /// Seconds an unused refresher is kept by the assembler (default: 3600)
    #[config(env = "TENANT_OAUTH_REFRESHER_IDLE", default = 3600)]
    pub refresher_idle: u64,
}

impl CredentialConfig {
    /// Build a configuration from the four credential values, using defaults elsewhere
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: &[&str],
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: scopes.join(","),
            redirect_url: redirect_url.into(),
            auth_url: "https://login.xero.com/identity/connect/authorize".to_string(),
            token_url: "https://identity.xero.com/connect/token".to_string(),
            connections_url: "https://api.xero.com/connections".to_string(),
            clock_skew: 10,
            exchange_timeout: 30,
            refresher_idle: 3600,
        }
    }

    /// Load from `TENANT_OAUTH_*` environment variables, then the optional TOML file
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder().env();
        if let Some(path) = file {
            builder = builder.file(path);
        }
        let config = builder.load()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a working exchanger
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("client_id"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::Missing("client_secret"));
        }
        for (field, value) in [
            ("redirect_url", &self.redirect_url),
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("connections_url", &self.connections_url),
        ] {
            Url::parse(value).map_err(|source| ConfigError::InvalidUrl { field, source })?;
        }
        for (field, value, min, max) in [
            ("clock_skew", self.clock_skew, 0, MAX_CLOCK_SKEW_SECS),
            ("exchange_timeout", self.exchange_timeout, 1, MAX_EXCHANGE_TIMEOUT_SECS),
            ("refresher_idle", self.refresher_idle, 0, MAX_REFRESHER_IDLE_SECS),
        ] {
            if !(min..=max).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Get scopes as a vector
    pub fn get_scopes(&self) -> Vec<String> {
        self.scopes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    // The getters clamp to the validated ranges for configurations built by hand

    pub fn clock_skew(&self) -> chrono::Duration {
        let seconds = self.clock_skew.min(MAX_CLOCK_SKEW_SECS);
        chrono::Duration::seconds(i64::try_from(seconds).unwrap_or(0))
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout.clamp(1, MAX_EXCHANGE_TIMEOUT_SECS))
    }

    pub fn refresher_idle(&self) -> Duration {
        Duration::from_secs(self.refresher_idle.min(MAX_REFRESHER_IDLE_SECS))
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("redirect_url", &self.redirect_url)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("connections_url", &self.connections_url)
            .field("clock_skew", &self.clock_skew)
            .field("exchange_timeout", &self.exchange_timeout)
            .field("refresher_idle", &self.refresher_idle)
            .finish()
    }
}
