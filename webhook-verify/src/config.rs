use crate::error::ConfigError;
use confique::Config;
use std::fmt;
use std::path::Path;

#[derive(Config, Clone)]
pub struct WebhookConfig {
    /// Key the webhook provider signs deliveries with
    #[config(env = "WEBHOOK_SIGNING_KEY")]
    pub signing_key: String,

    /// Largest body accepted for verification, in bytes (default: 1 MiB)
    #[config(env = "WEBHOOK_MAX_BODY_BYTES", default = 1048576)]
    pub max_body_bytes: usize,
}

impl WebhookConfig {
    /// Load from `WEBHOOK_*` environment variables, then the optional TOML file
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder().env();
        if let Some(path) = file {
            builder = builder.file(path);
        }
        let config = builder.load()?;
        if config.signing_key.is_empty() {
            return Err(ConfigError::Missing("signing_key"));
        }
        Ok(config)
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("signing_key", &"<redacted>")
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_from_env() {
        env::set_var("WEBHOOK_SIGNING_KEY", "from-env");
        env::set_var("WEBHOOK_MAX_BODY_BYTES", "2048");

        let config = WebhookConfig::load(None).unwrap();
        assert_eq!(config.signing_key, "from-env");
        assert_eq!(config.max_body_bytes, 2048);
        assert!(!format!("{config:?}").contains("from-env"));

        env::remove_var("WEBHOOK_SIGNING_KEY");
        env::remove_var("WEBHOOK_MAX_BODY_BYTES");
    }
}
