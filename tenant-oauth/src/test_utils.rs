//! Fakes for the pipeline's trait seams, shared by the unit tests.

use crate::error::{AuthError, ExchangeError, StoreError};
use crate::exchange::TokenExchange;
use crate::store::TokenStore;
use crate::token::{Principal, Token};
use crate::transport::Transport;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use log::LevelFilter;
use reqwest::header::HeaderMap;
use reqwest::{Method, Request, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

pub(crate) fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub(crate) fn fresh_token(access: &str) -> Token {
    Token {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: format!("{access}-refresh"),
        expiry: Some(Utc::now() + ChronoDuration::minutes(30)),
    }
}

pub(crate) fn expired_token(access: &str) -> Token {
    Token {
        expiry: Some(Utc::now() - ChronoDuration::minutes(5)),
        ..fresh_token(access)
    }
}

/// Token exchange that counts calls and hands out `refreshed-<n>` tokens
pub(crate) struct CountingExchange {
    pub calls: AtomicUsize,
    pub refresh_tokens: std::sync::Mutex<Vec<String>>,
    delay: Option<Duration>,
    fail: bool,
}

impl CountingExchange {
    pub fn new() -> Self {
        init_logger();
        Self {
            calls: AtomicUsize::new(0),
            refresh_tokens: std::sync::Mutex::new(vec![]),
            delay: None,
            fail: false,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl TokenExchange for CountingExchange {
    async fn exchange_code(&self, code: &str) -> Result<Token, ExchangeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(ExchangeError::Rejected {
                status: 400,
                error: "invalid_grant".to_string(),
                description: None,
            });
        }
        Ok(fresh_token(&format!("{code}-{n}")))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, ExchangeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ExchangeError::Rejected {
                status: 400,
                error: "invalid_grant".to_string(),
                description: None,
            });
        }
        Ok(fresh_token(&format!("refreshed-{n}")))
    }
}

/// Token store that records every write and can be told to fail
pub(crate) struct RecordingStore {
    sessions: Mutex<HashMap<Principal, Token>>,
    updates: Mutex<Vec<(Principal, Token)>>,
    creates: Mutex<Vec<(Principal, Token)>>,
    writes: AtomicUsize,
    reads: AtomicUsize,
    failing_writes: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            updates: Mutex::new(vec![]),
            creates: Mutex::new(vec![]),
            writes: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Put a session in place without counting it as a write
    pub async fn seed(&self, principal: &Principal, token: &Token) {
        self.sessions
            .lock()
            .await
            .insert(principal.clone(), token.clone());
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Successful `update_session` calls, in order
    pub async fn updates(&self) -> Vec<(Principal, Token)> {
        self.updates.lock().await.clone()
    }

    pub async fn creates(&self) -> Vec<(Principal, Token)> {
        self.creates.lock().await.clone()
    }

    pub async fn get(&self, principal: &Principal) -> Option<Token> {
        self.sessions.lock().await.get(principal).cloned()
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TokenStore for RecordingStore {
    async fn create_session(
        &self,
        principal: &Principal,
        token: &Token,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        self.sessions
            .lock()
            .await
            .insert(principal.clone(), token.clone());
        self.creates
            .lock()
            .await
            .push((principal.clone(), token.clone()));
        Ok(())
    }

    async fn update_session(
        &self,
        principal: &Principal,
        token: &Token,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        self.sessions
            .lock()
            .await
            .insert(principal.clone(), token.clone());
        self.updates
            .lock()
            .await
            .push((principal.clone(), token.clone()));
        Ok(())
    }

    async fn get_session(&self, principal: &Principal) -> Result<Option<Token>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.sessions.lock().await.get(principal).cloned())
    }
}

/// What a [`RecordingTransport`] saw for one request
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Innermost transport that records requests and answers 200 with an empty JSON object
pub(crate) struct RecordingTransport {
    pub seen: std::sync::Mutex<Vec<SeenRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            seen: std::sync::Mutex::new(vec![]),
        }
    }

    pub fn last(&self) -> SeenRequest {
        self.seen
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        request: Request,
        _cancel: &CancellationToken,
    ) -> Result<Response, AuthError> {
        self.seen.lock().unwrap().push(SeenRequest {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            body: request
                .body()
                .and_then(|body| body.as_bytes())
                .map(|bytes| bytes.to_vec()),
        });
        Ok(Response::from(http::Response::new("{}")))
    }
}
