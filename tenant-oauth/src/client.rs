//! Request-issuing client produced by the assembler

use crate::error::{ApiError, AuthError};
use crate::token::{Principal, TenantId};
use crate::transport::Transport;
use http::header::ACCEPT;
use log::{debug, error};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Client bound to one principal and one tenant.
///
/// Every request goes through the assembled transport stack, so it carries a currently
/// valid bearer credential and the tenant header. Cloning is cheap and clones share the
/// same token state.
#[derive(Clone)]
pub struct TenantClient {
    principal: Principal,
    tenant: TenantId,
    builder: Client,
    transport: Arc<dyn Transport>,
}

impl TenantClient {
    pub(crate) fn new(
        principal: Principal,
        tenant: TenantId,
        builder: Client,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            principal,
            tenant,
            builder,
            transport,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Start building a request; send it with [`TenantClient::send`]
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.builder.request(method, url)
    }

    /// Send a request through the pipeline and return the raw response
    pub async fn send(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response, AuthError> {
        let request = request.build()?;
        self.transport.send(request, cancel).await
    }

    /// GET a JSON document
    pub async fn get_json<R>(&self, url: &str, cancel: &CancellationToken) -> Result<R, AuthError>
    where
        R: DeserializeOwned,
    {
        let request = self
            .request(Method::GET, url)
            .header(ACCEPT, "application/json");
        self.send_json(request, cancel).await
    }

    /// POST a JSON payload and decode the JSON answer
    pub async fn post_json<T, R>(
        &self,
        url: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<R, AuthError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self.request(Method::POST, url).json(payload);
        self.send_json(request, cancel).await
    }

    /// PUT a JSON payload and decode the JSON answer
    pub async fn put_json<T, R>(
        &self,
        url: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<R, AuthError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self.request(Method::PUT, url).json(payload);
        self.send_json(request, cancel).await
    }

    /// DELETE a resource, discarding the answer body
    pub async fn delete(&self, url: &str, cancel: &CancellationToken) -> Result<(), AuthError> {
        self.send_checked(self.request(Method::DELETE, url), cancel)
            .await
            .map(|_| ())
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<R, AuthError> {
        let body = self.send_checked(request, cancel).await?;
        serde_json::from_slice(&body).map_err(|e| {
            error!("Failed to decode API response: {}", e);
            AuthError::Api(ApiError {
                detail: format!("JSON parse error: {e}"),
                ..ApiError::unknown()
            })
        })
    }

    /// Send and require a 2xx answer, decoding the API error body otherwise
    async fn send_checked(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AuthError> {
        let response = self.send(request, cancel).await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let api_error = ApiError::decode(&body);
            debug!(
                "API answered {} for tenant {}: {}",
                status, self.tenant, api_error
            );
            return Err(AuthError::Api(api_error));
        }
        Ok(body.to_vec())
    }
}

impl std::fmt::Debug for TenantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantClient")
            .field("principal", &self.principal)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}
