//! Per-principal token refresh with single-flight coordination

use crate::deadline::bounded;
use crate::error::AuthError;
use crate::exchange::TokenExchange;
use crate::store::TokenStore;
use crate::token::{Principal, Token};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Something that can hand out a currently-valid token for each outbound request
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, cancel: &CancellationToken) -> Result<Token, AuthError>;
}

/// Working copy of the session token.
///
/// `persisted` is false only after an exchange succeeded but the store write did not.
#[derive(Debug, Clone)]
struct HeldToken {
    token: Token,
    persisted: bool,
}

/// Keeps the token of one principal usable, refreshing and persisting it on demand.
///
/// Concurrent callers that observe an expired token share a single refresh: the first
/// one starts the exchange and store write while the others wait on the refresh guard
/// and then pick up the replacement.
///
/// The exchange and store write run on a detached task that owns the refresh guard, so a
/// caller whose cancellation token fires gets [`AuthError::Cancelled`] while the refresh
/// still completes and is recorded.
///
/// When the exchange succeeds but the store write fails, the call returns
/// [`AuthError::Persistence`] and the new token is kept in memory as unpersisted. The
/// next call retries the store write (without a new exchange) and only returns the token
/// once it has been recorded.
pub struct TokenRefresher {
    job: RefreshJob,
    refresh_guard: Arc<Mutex<()>>,
    clock_skew: chrono::Duration,
}

/// State a refresh needs after the caller that started it has gone away
#[derive(Clone)]
struct RefreshJob {
    principal: Principal,
    exchanger: Arc<dyn TokenExchange>,
    store: Arc<dyn TokenStore>,
    held: Arc<RwLock<HeldToken>>,
    timeout: Option<Duration>,
}

impl TokenRefresher {
    /// Create a refresher around a token that is already recorded in `store`
    pub fn new(
        principal: Principal,
        token: Token,
        exchanger: Arc<dyn TokenExchange>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            job: RefreshJob {
                principal,
                exchanger,
                store,
                held: Arc::new(RwLock::new(HeldToken {
                    token,
                    persisted: true,
                })),
                timeout: None,
            },
            refresh_guard: Arc::new(Mutex::new(())),
            clock_skew: chrono::Duration::seconds(10),
        }
    }

    /// Load the principal's token from `store` and wrap it
    pub async fn from_store(
        principal: Principal,
        exchanger: Arc<dyn TokenExchange>,
        store: Arc<dyn TokenStore>,
        cancel: &CancellationToken,
    ) -> Result<Self, AuthError> {
        let token = bounded(
            async {
                store
                    .get_session(&principal)
                    .await
                    .map_err(AuthError::Store)
            },
            None,
            cancel,
        )
        .await?
        .ok_or_else(|| AuthError::SessionNotFound(principal.clone()))?;
        Ok(Self::new(principal, token, exchanger, store))
    }

    /// Treat tokens as expired this long before their actual expiry
    pub fn with_clock_skew(mut self, skew: chrono::Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Bound each exchange and store call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job.timeout = Some(timeout);
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.job.principal
    }

    /// Return a usable token, refreshing and persisting it first when it has expired
    pub async fn token(&self, cancel: &CancellationToken) -> Result<Token, AuthError> {
        if let Some(token) = self.usable_token().await {
            return Ok(token);
        }

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            guard = self.refresh_guard.clone().lock_owned() => guard,
        };

        // Another caller may have refreshed while we waited for the guard
        let held = self.job.held.read().await.clone();
        let usable = held.token.is_usable_at(Utc::now(), self.clock_skew);
        if usable && held.persisted {
            return Ok(held.token);
        }

        // The guard is released only once the detached refresh has finished
        let job = self.job.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            if usable {
                job.persist(held.token).await
            } else {
                job.refresh(held.token).await
            }
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(
                    "Caller cancelled while refreshing for principal '{}'",
                    self.job.principal
                );
                Err(AuthError::Cancelled)
            }
            joined = task => joined?,
        }
    }

    /// Replace the held token with one that was just recorded in the store
    pub async fn adopt(&self, token: Token) {
        let _guard = self.refresh_guard.lock().await;
        *self.job.held.write().await = HeldToken {
            token,
            persisted: true,
        };
        debug!("Adopted new session token for principal '{}'", self.job.principal);
    }

    async fn usable_token(&self) -> Option<Token> {
        let held = self.job.held.read().await;
        (held.persisted && held.token.is_usable_at(Utc::now(), self.clock_skew))
            .then(|| held.token.clone())
    }
}

impl RefreshJob {
    async fn refresh(&self, expired: Token) -> Result<Token, AuthError> {
        debug!(
            "Token for principal '{}' expired at {:?}, refreshing",
            self.principal, expired.expiry
        );

        let fresh = bounded(
            async {
                self.exchanger
                    .refresh(&expired.refresh_token)
                    .await
                    .map_err(AuthError::from)
            },
            self.timeout,
            &CancellationToken::new(),
        )
        .await
        .inspect_err(|e| warn!("Refresh failed for principal '{}': {}", self.principal, e))?;

        self.persist(fresh).await
    }

    /// Write `token` to the store and adopt it, remembering a failed write for retry
    async fn persist(&self, token: Token) -> Result<Token, AuthError> {
        let result = bounded(
            async {
                self.store
                    .update_session(&self.principal, &token)
                    .await
                    .map_err(AuthError::Persistence)
            },
            self.timeout,
            &CancellationToken::new(),
        )
        .await;

        let persisted = result.is_ok();
        *self.held.write().await = HeldToken {
            token: token.clone(),
            persisted,
        };

        match result {
            Ok(()) => {
                info!("Refreshed token for principal '{}'", self.principal);
                Ok(token)
            }
            Err(e) => {
                error!(
                    "Token for principal '{}' was refreshed but not persisted: {}",
                    self.principal, e
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TokenSource for TokenRefresher {
    async fn token(&self, cancel: &CancellationToken) -> Result<Token, AuthError> {
        TokenRefresher::token(self, cancel).await
    }
}
