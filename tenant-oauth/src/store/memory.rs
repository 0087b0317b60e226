use super::TokenStore;
use crate::error::StoreError;
use crate::token::{Principal, Token};
use async_trait::async_trait;
use log::debug;
use moka::future::Cache as MokaCache;
use moka::ops::compute::{CompResult, Op};

/// Process-local token store backed by Moka.
///
/// Entries never expire on their own: a session lives until the process exits or the
/// capacity bound (number of principals) evicts it.
#[derive(Clone)]
pub struct InMemoryTokenStore {
    sessions: MokaCache<Principal, Token>,
}

impl InMemoryTokenStore {
    /// Initialize a new in-memory store holding at most `capacity` sessions
    pub fn new(capacity: u64) -> Self {
        Self {
            sessions: MokaCache::builder().max_capacity(capacity).build(),
        }
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create_session(
        &self,
        principal: &Principal,
        token: &Token,
    ) -> Result<(), StoreError> {
        self.sessions.insert(principal.clone(), token.clone()).await;
        debug!("Created session for principal '{}'", principal);
        Ok(())
    }

    async fn update_session(
        &self,
        principal: &Principal,
        token: &Token,
    ) -> Result<(), StoreError> {
        let replacement = token.clone();
        let result = self
            .sessions
            .entry_by_ref(principal)
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(_) => Op::Put(replacement),
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::ReplacedWith(_) => {
                debug!("Updated session for principal '{}'", principal);
                Ok(())
            }
            _ => Err(StoreError::SessionNotFound(principal.clone())),
        }
    }

    async fn get_session(&self, principal: &Principal) -> Result<Option<Token>, StoreError> {
        Ok(self.sessions.get(principal).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(access: &str) -> Token {
        Token {
            access_token: access.to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: format!("{access}-refresh"),
            expiry: Some(Utc::now() + Duration::minutes(30)),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let store = InMemoryTokenStore::default();
        let principal = Principal::new("user-1");

        assert_eq!(store.get_session(&principal).await.unwrap(), None);

        let created = token("a1");
        store.create_session(&principal, &created).await.unwrap();
        assert_eq!(store.get_session(&principal).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_update_existing_session() {
        let store = InMemoryTokenStore::default();
        let principal = Principal::new("user-1");
        store.create_session(&principal, &token("a1")).await.unwrap();

        let replacement = token("a2");
        store.update_session(&principal, &replacement).await.unwrap();

        assert_eq!(
            store.get_session(&principal).await.unwrap(),
            Some(replacement)
        );
    }

    #[tokio::test]
    async fn test_update_unknown_session_fails() {
        let store = InMemoryTokenStore::default();
        let principal = Principal::new("ghost");

        let result = store.update_session(&principal, &token("a1")).await;
        assert!(matches!(result, Err(StoreError::SessionNotFound(p)) if p == principal));
        assert_eq!(store.get_session(&principal).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_per_principal() {
        let store = InMemoryTokenStore::default();
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");
        store.create_session(&alice, &token("alice-token")).await.unwrap();
        store.create_session(&bob, &token("bob-token")).await.unwrap();

        store.update_session(&alice, &token("alice-2")).await.unwrap();

        let bob_token = store.get_session(&bob).await.unwrap().unwrap();
        assert_eq!(bob_token.access_token, "bob-token");
    }
}
