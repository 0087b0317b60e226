//! # tenant-oauth
//!
//! Client-side authorization for a multi-tenant OAuth2-protected API.
//!
//! ## Components
//!
//! - **Config:** OAuth2 application credentials and identity provider endpoints.
//! - **Exchange:** Authorization code and refresh token exchanges against the token endpoint.
//! - **Store:** Capability interface for persisting the token of each principal.
//! - **Refresher:** Keeps a principal's token usable, with single-flight refresh.
//! - **Transport:** Network transport plus the tenant and bearer decorators.
//! - **Assembler:** Composes the above into a [`TenantClient`] bound to one tenant.

pub mod assembler;
pub mod client;
pub mod config;
pub mod connections;
mod deadline;
pub mod error;
pub mod exchange;
pub mod refresher;
pub mod store;
pub mod token;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use assembler::{ClientAssembler, Session};
pub use client::TenantClient;
pub use config::CredentialConfig;
pub use connections::{list_connections, remove_connection, Connection};
pub use error::{ApiError, AuthError, ConfigError, ExchangeError, StoreError};
pub use exchange::{Provider, TokenExchange};
pub use refresher::{TokenRefresher, TokenSource};
pub use store::{InMemoryTokenStore, TokenStore};
pub use token::{Principal, TenantId, Token};
pub use transport::{BearerTransport, HttpTransport, TenantTransport, Transport, TENANT_ID_HEADER};
