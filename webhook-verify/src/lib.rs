//! # webhook-verify
//!
//! Signature verification for incoming webhook deliveries.
//!
//! The provider signs the raw request body with HMAC-SHA256 and sends the base64 digest
//! in the `x-xero-signature` header. [`verify_webhook`] checks that digest in front of the
//! application handler and replays the untouched body to it.

pub mod config;
pub mod error;
pub mod middleware;
pub mod signature;

pub use config::WebhookConfig;
pub use error::{ConfigError, WebhookError};
pub use middleware::{verify_webhook, WebhookVerifier};
pub use signature::{sign, verify_signature, SIGNATURE_HEADER};
