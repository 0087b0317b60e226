use crate::error::StoreError;
use crate::token::{Principal, Token};

pub mod memory;

pub use memory::InMemoryTokenStore;

/// Persistence capability for the current token of each principal.
///
/// The pipeline only calls this interface; it never batches, caches or retries around it.
/// Implementations must make every call atomic per principal so that a reader never
/// observes a partially written token.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Record the first token of a new session
    async fn create_session(&self, principal: &Principal, token: &Token)
        -> Result<(), StoreError>;

    /// Replace the token of an existing session
    async fn update_session(&self, principal: &Principal, token: &Token)
        -> Result<(), StoreError>;

    /// Fetch the current token, `None` when the principal has no session
    async fn get_session(&self, principal: &Principal) -> Result<Option<Token>, StoreError>;
}
