//! ============================================================================
//! Proxy Handler - Stateless try-on request handling
//! ============================================================================
//! Maps one HTTP request to one response:
//! - OPTIONS: 200, empty body
//! - POST: validate, relay to the gateway, map the upstream outcome
//!   429 -> 429, 402 -> 402, other failures -> 500,
//!   success without an image -> 422, success with an image -> 200
//! Any error while handling becomes a 500 carrying its message. The server
//! attaches `CORS_HEADERS` to every response.
//! ============================================================================

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use super::gateway::{extract_image, extract_text, ChatRequest, ImageGateway};
use crate::config::ProxyConfig;
use crate::types::{
    ErrorBody, TryOnRequest, TryOnResult, DEFAULT_SUCCESS_MESSAGE, MISSING_IMAGES_MESSAGE,
    NO_IMAGE_MESSAGE, RATE_LIMIT_MESSAGE, USAGE_LIMIT_MESSAGE,
};

/// Permissive CORS headers sent with every response
pub const CORS_HEADERS: &[(&str, &str)] = &[
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Headers",
        "authorization, x-client-info, apikey, content-type",
    ),
    ("Access-Control-Allow-Methods", "POST, OPTIONS"),
];

/// Returned when the server itself is misconfigured
const GENERIC_FAILURE_MESSAGE: &str = "Internal server error";

/// Status code and optional JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Option<String>,
}

impl ProxyResponse {
    /// Empty 200 for CORS preflight
    pub fn preflight() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status,
                body: Some(body),
            },
            Err(e) => Self::error(500, e.to_string()),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let body = ErrorBody::new(message);
        Self {
            status,
            // ErrorBody is two plain strings; serialization can't fail
            body: serde_json::to_string(&body).ok(),
        }
    }

    /// Parsed body, mostly for tests and logging
    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
    }
}

/// The remote generation proxy
pub struct TryOnProxy {
    config: ProxyConfig,
    gateway: Arc<dyn ImageGateway>,
}

impl TryOnProxy {
    pub fn new(config: ProxyConfig, gateway: Arc<dyn ImageGateway>) -> Self {
        Self { config, gateway }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Dispatch on the HTTP method
    pub async fn handle(&self, method: &str, body: &[u8]) -> ProxyResponse {
        match method.to_ascii_uppercase().as_str() {
            "OPTIONS" => ProxyResponse::preflight(),
            "POST" => self.handle_try_on(body).await,
            other => {
                info!("Rejecting {} request", other);
                ProxyResponse::error(405, "Method not allowed")
            }
        }
    }

    /// Handle a try-on POST body; never fails
    pub async fn handle_try_on(&self, body: &[u8]) -> ProxyResponse {
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let request_id = &request_id[..8];

        match self.try_on(request_id, body).await {
            Ok(response) => {
                info!("[{}] Responding {}", request_id, response.status);
                response
            }
            Err(e) => {
                error!("[{}] Virtual try-on error: {}", request_id, e);
                ProxyResponse::error(500, e.to_string())
            }
        }
    }

    async fn try_on(&self, request_id: &str, body: &[u8]) -> Result<ProxyResponse> {
        let request: TryOnRequest =
            serde_json::from_slice(body).map_err(|e| anyhow!("Invalid request body: {}", e))?;

        info!(
            "[{}] Received request with personImage length: {}, outfitImage length: {}",
            request_id,
            request.person_image.as_deref().map_or(0, str::len),
            request.outfit_image.as_deref().map_or(0, str::len),
        );

        let Some((person_image, outfit_image)) = request.images() else {
            return Ok(ProxyResponse::error(400, MISSING_IMAGES_MESSAGE));
        };

        let Some(api_key) = self.config.api_key.as_deref() else {
            error!("[{}] AI_GATEWAY_API_KEY is not configured", request_id);
            return Ok(ProxyResponse::error(500, GENERIC_FAILURE_MESSAGE));
        };

        info!("[{}] Calling AI gateway for virtual try-on", request_id);
        let chat = ChatRequest::try_on(&self.config.model, person_image, outfit_image);
        let reply = self.gateway.complete(api_key, &chat).await?;

        match reply.status {
            200..=299 => {}
            429 => return Ok(ProxyResponse::error(429, RATE_LIMIT_MESSAGE)),
            402 => return Ok(ProxyResponse::error(402, USAGE_LIMIT_MESSAGE)),
            status => {
                error!("[{}] AI gateway error: {} {}", request_id, status, reply.body);
                return Ok(ProxyResponse::error(
                    500,
                    format!("AI processing failed: {}", status),
                ));
            }
        }

        let data: Value = serde_json::from_str(&reply.body)
            .map_err(|e| anyhow!("Failed to parse AI gateway response: {}", e))?;
        let text = extract_text(&data);

        let Some(result_image) = extract_image(&data) else {
            error!("[{}] No image generated. Response: {}", request_id, data);
            return Ok(ProxyResponse::json(
                422,
                &ErrorBody::new(NO_IMAGE_MESSAGE).with_details(text),
            ));
        };

        Ok(ProxyResponse::json(
            200,
            &TryOnResult {
                result_image,
                message: text.unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string()),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::UpstreamReply;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestGateway {
        reply: Result<UpstreamReply, String>,
        calls: AtomicUsize,
    }

    impl TestGateway {
        fn replying(status: u16, body: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(UpstreamReply {
                    status,
                    body: body.to_string(),
                }),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageGateway for TestGateway {
        async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<UpstreamReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(api_key, "test-key");
            assert_eq!(request.messages[0].content.len(), 3);
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    fn proxy(gateway: Arc<TestGateway>) -> TryOnProxy {
        let config = ProxyConfig {
            api_key: Some("test-key".to_string()),
            ..ProxyConfig::default()
        };
        TryOnProxy::new(config, gateway)
    }

    fn valid_body() -> Vec<u8> {
        json!({ "personImage": "data:image/png;base64,AA", "outfitImage": "data:image/png;base64,BB" })
            .to_string()
            .into_bytes()
    }

    fn image_reply(content: Option<&str>) -> Value {
        json!({
            "choices": [{ "message": {
                "content": content,
                "images": [{ "image_url": { "url": "data:image/png;base64,RESULT" } }]
            } }]
        })
    }

    #[tokio::test]
    async fn test_preflight() {
        let proxy = proxy(TestGateway::replying(200, json!({})));
        let response = proxy.handle("OPTIONS", b"").await;
        assert_eq!(response, ProxyResponse::preflight());
    }

    #[tokio::test]
    async fn test_missing_images_is_400() {
        let gateway = TestGateway::replying(200, json!({}));
        let proxy = proxy(gateway.clone());

        for body in [
            json!({}),
            json!({ "personImage": "data:a" }),
            json!({ "personImage": "", "outfitImage": "data:b" }),
            json!({ "personImage": false, "outfitImage": 0 }),
            json!({ "personImage": null, "outfitImage": "data:b" }),
        ] {
            let response = proxy.handle("POST", body.to_string().as_bytes()).await;
            assert_eq!(response.status, 400);
            assert_eq!(
                response.body.as_deref(),
                Some(r#"{"error":"Both person and outfit images are required"}"#)
            );
        }
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_is_generic_500() {
        let gateway = TestGateway::replying(200, image_reply(None));
        let proxy = TryOnProxy::new(ProxyConfig::default(), gateway.clone());

        let response = proxy.handle("POST", &valid_body()).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.body_json().unwrap()["error"], GENERIC_FAILURE_MESSAGE);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_and_quota() {
        let response = proxy(TestGateway::replying(429, json!({})))
            .handle("POST", &valid_body())
            .await;
        assert_eq!(response.status, 429);
        assert_eq!(response.body_json().unwrap()["error"], RATE_LIMIT_MESSAGE);

        let response = proxy(TestGateway::replying(402, json!({})))
            .handle("POST", &valid_body())
            .await;
        assert_eq!(response.status, 402);
        assert_eq!(response.body_json().unwrap()["error"], USAGE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_other_upstream_failure_is_500() {
        let response = proxy(TestGateway::replying(503, json!({ "error": "overloaded" })))
            .handle("POST", &valid_body())
            .await;
        assert_eq!(response.status, 500);
        assert_eq!(response.body_json().unwrap()["error"], "AI processing failed: 503");
    }

    #[tokio::test]
    async fn test_no_image_is_422_with_details() {
        let reply = json!({ "choices": [{ "message": { "content": "I need a clearer photo." } }] });
        let response = proxy(TestGateway::replying(200, reply))
            .handle("POST", &valid_body())
            .await;
        assert_eq!(response.status, 422);
        let body = response.body_json().unwrap();
        assert_eq!(body["error"], NO_IMAGE_MESSAGE);
        assert_eq!(body["details"], "I need a clearer photo.");
    }

    #[tokio::test]
    async fn test_success() {
        let response = proxy(TestGateway::replying(200, image_reply(Some("Looks great"))))
            .handle("POST", &valid_body())
            .await;
        assert_eq!(response.status, 200);
        let body = response.body_json().unwrap();
        assert_eq!(body["resultImage"], "data:image/png;base64,RESULT");
        assert_eq!(body["message"], "Looks great");

        let response = proxy(TestGateway::replying(200, image_reply(None)))
            .handle("POST", &valid_body())
            .await;
        assert_eq!(response.body_json().unwrap()["message"], DEFAULT_SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_exceptions_become_500() {
        let gateway = Arc::new(TestGateway {
            reply: Err("connection reset".to_string()),
            calls: AtomicUsize::new(0),
        });
        let response = proxy(gateway).handle("POST", &valid_body()).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.body_json().unwrap()["error"], "connection reset");

        let response = proxy(TestGateway::replying(200, json!({})))
            .handle("POST", b"not json")
            .await;
        assert_eq!(response.status, 500);
        assert!(response.body_json().unwrap()["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let response = proxy(TestGateway::replying(200, json!({})))
            .handle("GET", b"")
            .await;
        assert_eq!(response.status, 405);
    }
}
