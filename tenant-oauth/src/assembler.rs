//! Composition of the per-tenant request pipeline

use crate::client::TenantClient;
use crate::config::CredentialConfig;
use crate::deadline::bounded;
use crate::error::{AuthError, ConfigError};
use crate::exchange::{Provider, TokenExchange};
use crate::refresher::{TokenRefresher, TokenSource};
use crate::store::TokenStore;
use crate::token::{Principal, TenantId, Token};
use crate::transport::{BearerTransport, HttpTransport, TenantTransport, Transport};
use log::{debug, error, info};
use moka::future::Cache;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything needed to assemble a client from a token the caller already holds
#[derive(Clone)]
pub struct Session {
    pub token: Token,
    pub principal: Principal,
    pub tenant: TenantId,
    pub store: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("principal", &self.principal)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

/// Address of a store instance; two handles are the same store when they point at it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StoreId(usize);

impl StoreId {
    fn of(store: &dyn TokenStore) -> Self {
        Self(std::ptr::from_ref(store).cast::<()>() as usize)
    }
}

type RefresherKey = (Principal, StoreId);

/// One refresher per (principal, store).
///
/// `live` tracks every refresher some client still holds, so a principal never gets a
/// second refresher while the first is in use. `keep_alive` additionally holds each
/// refresher for `refresher_idle` after it was last handed out.
struct RefresherRegistry {
    live: Mutex<HashMap<RefresherKey, Weak<TokenRefresher>>>,
    keep_alive: Cache<RefresherKey, Arc<TokenRefresher>>,
}

impl RefresherRegistry {
    fn new(idle: Duration) -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            keep_alive: Cache::builder().time_to_idle(idle).build(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RefresherKey, Weak<TokenRefresher>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find_live(&self, key: &RefresherKey) -> Option<Arc<TokenRefresher>> {
        self.lock().get(key).and_then(Weak::upgrade)
    }

    async fn find(&self, key: &RefresherKey) -> Option<Arc<TokenRefresher>> {
        let found = self.find_live(key)?;
        self.keep_alive.insert(key.clone(), found.clone()).await;
        Some(found)
    }

    async fn get_or_insert(
        &self,
        key: RefresherKey,
        create: impl FnOnce() -> TokenRefresher,
    ) -> Arc<TokenRefresher> {
        let refresher = {
            let mut live = self.lock();
            match live.get(&key).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    live.retain(|_, weak| weak.strong_count() > 0);
                    let created = Arc::new(create());
                    live.insert(key.clone(), Arc::downgrade(&created));
                    created
                }
            }
        };
        self.keep_alive.insert(key, refresher.clone()).await;
        refresher
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Builds [`TenantClient`]s: network transport, then tenant header, then bearer credential.
///
/// Refreshers are kept per principal and store, so clients for several tenants of the
/// same principal share one token and refresh it at most once at a time. A refresher
/// stays registered while any client holds it, and for `refresher_idle` after it was
/// last handed out.
#[derive(Clone)]
pub struct ClientAssembler {
    exchanger: Arc<dyn TokenExchange>,
    builder: Client,
    transport: Arc<dyn Transport>,
    refreshers: Arc<RefresherRegistry>,
    clock_skew: chrono::Duration,
    timeout: Duration,
}

impl ClientAssembler {
    /// Assembler talking to the configured identity provider over a fresh HTTP client
    pub fn new(config: Arc<CredentialConfig>) -> Result<Self, ConfigError> {
        let provider = Provider::new(config.clone())?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self::with_parts(
            &config,
            Arc::new(provider),
            client.clone(),
            Arc::new(HttpTransport::new(client)),
        ))
    }

    /// Assembler over explicit parts; `builder` only builds requests, `transport` sends them
    pub fn with_parts(
        config: &CredentialConfig,
        exchanger: Arc<dyn TokenExchange>,
        builder: Client,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            exchanger,
            builder,
            transport,
            refreshers: Arc::new(RefresherRegistry::new(config.refresher_idle())),
            clock_skew: config.clock_skew(),
            timeout: config.exchange_timeout(),
        }
    }

    /// Client for `principal` scoped to `tenant`, with the token loaded from `store`
    pub async fn build_client(
        &self,
        principal: Principal,
        tenant: TenantId,
        store: Arc<dyn TokenStore>,
        cancel: &CancellationToken,
    ) -> Result<TenantClient, AuthError> {
        let key = (principal.clone(), StoreId::of(store.as_ref()));
        let refresher = match self.refreshers.find(&key).await {
            Some(refresher) => refresher,
            None => {
                let token = self.load_session(&principal, store.as_ref(), cancel).await?;
                self.register(key, token, store).await
            }
        };
        self.compose(principal, tenant, refresher)
    }

    /// Client from an explicit session.
    ///
    /// If a refresher for the principal and store is already registered, its token wins
    /// over the one in the session.
    pub async fn build_client_from_session(
        &self,
        session: Session,
    ) -> Result<TenantClient, AuthError> {
        let Session {
            token,
            principal,
            tenant,
            store,
        } = session;
        let key = (principal.clone(), StoreId::of(store.as_ref()));
        let refresher = self.register(key, token, store).await;
        self.compose(principal, tenant, refresher)
    }

    /// Exchange an authorization code and record the resulting session.
    ///
    /// A refresher already registered for the principal and store adopts the new token,
    /// so existing clients switch to it and keep sharing one refresh guard.
    pub async fn complete_authorization(
        &self,
        principal: &Principal,
        code: &str,
        store: &dyn TokenStore,
        cancel: &CancellationToken,
    ) -> Result<Token, AuthError> {
        let token = bounded(
            async { self.exchanger.exchange_code(code).await.map_err(AuthError::from) },
            Some(self.timeout),
            cancel,
        )
        .await?;

        bounded(
            async {
                store
                    .create_session(principal, &token)
                    .await
                    .map_err(AuthError::Persistence)
            },
            Some(self.timeout),
            cancel,
        )
        .await
        .inspect_err(|e| error!("Failed to record session for {}: {}", principal, e))?;

        let key = (principal.clone(), StoreId::of(store));
        if let Some(refresher) = self.refreshers.find(&key).await {
            refresher.adopt(token.clone()).await;
        }
        info!("Authorization completed for {}", principal);
        Ok(token)
    }

    async fn load_session(
        &self,
        principal: &Principal,
        store: &dyn TokenStore,
        cancel: &CancellationToken,
    ) -> Result<Token, AuthError> {
        debug!("Loading session for {}", principal);
        bounded(
            async { store.get_session(principal).await.map_err(AuthError::Store) },
            Some(self.timeout),
            cancel,
        )
        .await?
        .ok_or_else(|| AuthError::SessionNotFound(principal.clone()))
    }

    async fn register(
        &self,
        key: RefresherKey,
        token: Token,
        store: Arc<dyn TokenStore>,
    ) -> Arc<TokenRefresher> {
        let principal = key.0.clone();
        self.refreshers
            .get_or_insert(key, || {
                TokenRefresher::new(principal, token, self.exchanger.clone(), store)
                    .with_clock_skew(self.clock_skew)
                    .with_timeout(self.timeout)
            })
            .await
    }

    fn compose(
        &self,
        principal: Principal,
        tenant: TenantId,
        refresher: Arc<TokenRefresher>,
    ) -> Result<TenantClient, AuthError> {
        let source: Arc<dyn TokenSource> = refresher;
        let stack = BearerTransport::new(
            TenantTransport::new(self.transport.clone(), tenant)?,
            source,
        );
        Ok(TenantClient::new(
            principal,
            tenant,
            self.builder.clone(),
            Arc::new(stack),
        ))
    }
}

impl std::fmt::Debug for ClientAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAssembler")
            .field("refreshers", &self.refreshers.len())
            .field("clock_skew", &self.clock_skew)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
