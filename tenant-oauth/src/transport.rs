//! Request transports and the decorators layered on top of them.
//!
//! A pipeline is built innermost first: [`HttpTransport`] puts requests on the wire,
//! [`TenantTransport`] stamps the tenant header and [`BearerTransport`] attaches the
//! Authorization credential obtained from a [`TokenSource`].

use crate::deadline::bounded;
use crate::error::AuthError;
use crate::refresher::TokenSource;
use crate::token::TenantId;
use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use log::debug;
use reqwest::{Client, Request, Response};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Header carrying the tenant a request is scoped to
pub const TENANT_ID_HEADER: &str = "xero-tenant-id";

/// Sends a fully built request and returns the raw response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request, cancel: &CancellationToken)
        -> Result<Response, AuthError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, AuthError> {
        (**self).send(request, cancel).await
    }
}

/// Network-facing transport backed by a shared `reqwest` client
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, AuthError> {
        debug!("{} {}", request.method(), request.url());
        bounded(
            async { self.client.execute(request).await.map_err(AuthError::from) },
            None,
            cancel,
        )
        .await
    }
}

/// Stamps every request with one fixed tenant.
///
/// The tenant is set at construction and cannot be changed; talking to another tenant
/// takes another pipeline.
#[derive(Clone, Debug)]
pub struct TenantTransport<T> {
    inner: T,
    tenant: TenantId,
    header_value: HeaderValue,
}

impl<T: Transport> TenantTransport<T> {
    pub fn new(inner: T, tenant: TenantId) -> Result<Self, AuthError> {
        let header_value = HeaderValue::from_str(&tenant.to_string()).map_err(|_| {
            AuthError::InvalidRequest(format!("tenant id {tenant} is not a valid header value"))
        })?;
        Ok(Self {
            inner,
            tenant,
            header_value,
        })
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }
}

#[async_trait]
impl<T: Transport> Transport for TenantTransport<T> {
    async fn send(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, AuthError> {
        request
            .headers_mut()
            .insert(TENANT_ID_HEADER, self.header_value.clone());
        self.inner.send(request, cancel).await
    }
}

/// Attaches `Authorization: <type> <access token>` from a token source to every request
pub struct BearerTransport<T> {
    inner: T,
    source: Arc<dyn TokenSource>,
}

impl<T: Transport> BearerTransport<T> {
    pub fn new(inner: T, source: Arc<dyn TokenSource>) -> Self {
        Self { inner, source }
    }
}

#[async_trait]
impl<T: Transport> Transport for BearerTransport<T> {
    async fn send(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, AuthError> {
        let token = self.source.token(cancel).await?;
        let mut value = HeaderValue::from_str(&token.authorization_value()).map_err(|_| {
            AuthError::InvalidRequest("access token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        self.inner.send(request, cancel).await
    }
}
