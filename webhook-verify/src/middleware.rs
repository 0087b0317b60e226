//! Axum middleware rejecting webhook deliveries whose signature does not match

use crate::config::WebhookConfig;
use crate::error::WebhookError;
use crate::signature::{verify_signature, SIGNATURE_HEADER};
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http_body_util::LengthLimitError;
use log::{debug, warn};
use std::sync::Arc;

/// Signing key and body limit shared by the middleware
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Arc<[u8]>,
    max_body_bytes: usize,
}

impl WebhookVerifier {
    pub fn new(key: impl AsRef<[u8]>, max_body_bytes: usize) -> Self {
        Self {
            key: Arc::from(key.as_ref()),
            max_body_bytes,
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(config.signing_key.as_bytes(), config.max_body_bytes)
    }

    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        verify_signature(body, signature, &self.key)
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

/// Buffer the body, check its signature and hand the same bytes to the next handler.
///
/// Install with `axum::middleware::from_fn_with_state(verifier, verify_webhook)`.
pub async fn verify_webhook(
    State(verifier): State<WebhookVerifier>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, WebhookError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, verifier.max_body_bytes)
        .await
        .map_err(|e| match e.into_inner().downcast::<LengthLimitError>() {
            Ok(_) => WebhookError::BodyTooLarge(verifier.max_body_bytes),
            Err(e) => WebhookError::Body(e.to_string()),
        })
        .inspect_err(|e| warn!("Rejecting webhook: {}", e))?;

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(e) = verifier.verify(&bytes, signature) {
        warn!("Rejecting webhook on {}: {}", parts.uri.path(), e);
        return Err(e);
    }

    debug!("Webhook signature verified ({} bytes)", bytes.len());
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign;
    use axum::routing::post;
    use axum::Router;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use log::LevelFilter;
    use tower::ServiceExt;

    const TEST_ROUTE: &str = "/webhooks";
    const KEY: &[u8] = b"signing-key";

    fn setup_app(max_body_bytes: usize) -> Router {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
        let verifier = WebhookVerifier::new(KEY, max_body_bytes);
        Router::new()
            .route(TEST_ROUTE, post(async |body: String| (StatusCode::OK, body)))
            .layer(axum::middleware::from_fn_with_state(verifier, verify_webhook))
    }

    async fn send_request(
        app: &Router,
        body: &str,
        signature: Option<&str>,
    ) -> (StatusCode, String) {
        let mut request_builder = Request::builder().method("POST").uri(TEST_ROUTE);
        if let Some(signature) = signature {
            request_builder = request_builder.header(SIGNATURE_HEADER, signature);
        }
        let request = request_builder
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();
        let body = String::from_utf8(body_bytes.to_vec())
            .expect("Failed to convert response body to string");
        (status, body)
    }

    #[tokio::test]
    async fn test_valid_signature_replays_body() {
        let app = setup_app(1024);
        let body = r#"{"events":[{"resourceId":"abc"}]}"#;
        let signature = sign(body.as_bytes(), KEY).unwrap();

        let (status, echoed) = send_request(&app, body, Some(&signature)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(echoed, body);
    }

    #[tokio::test]
    async fn test_tampered_body_rejected() {
        let app = setup_app(1024);
        let signature = sign(br#"{"events":[]}"#, KEY).unwrap();

        let (status, body) = send_request(&app, r#"{"events":[1]}"#, Some(&signature)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Webhook signature mismatch"));
    }

    #[tokio::test]
    async fn test_missing_signature_rejected() {
        let app = setup_app(1024);
        let (status, body) = send_request(&app, "{}", None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Missing webhook signature header"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let app = setup_app(8);
        let body = r#"{"events":[]}"#;
        let signature = sign(body.as_bytes(), KEY).unwrap();

        let (status, _) = send_request(&app, body, Some(&signature)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
