//! ============================================================================
//! AI Gateway - Multimodal chat completion producing the try-on image
//! ============================================================================
//! Sends the person photo, the outfit photo and a fixed instruction to an
//! OpenAI-style chat-completions endpoint, asking for image + text output.
//! The reply is returned raw; status mapping happens in the handler.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ProxyConfig;

/// Instruction sent alongside the two images
pub const TRYON_INSTRUCTION: &str = "You are an expert fashion AI. Produce a photorealistic virtual try-on:
1. Keep the person from the first image exactly as they are: face, hair, body pose, skin tone, proportions and accessories
2. Replace the clothing they wear with the outfit shown in the second image
3. Fit the new clothing naturally to their body shape and pose
4. Keep lighting, shadows and fabric texture realistic and consistent with the original photo
5. Blend seamlessly so the result reads as a professional fashion photograph

Return a single image of the person wearing the new outfit.";

// ============================================================================
// Chat Completion Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub modalities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatRequest {
    /// Build the try-on request for the given images
    pub fn try_on(model: &str, person_image: &str, outfit_image: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: TRYON_INSTRUCTION.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: person_image.to_string(),
                        },
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: outfit_image.to_string(),
                        },
                    },
                ],
            }],
            modalities: vec!["image".to_string(), "text".to_string()],
        }
    }
}

/// Raw upstream reply
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: String,
}

/// The upstream multimodal model
#[async_trait]
pub trait ImageGateway: Send + Sync {
    async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<UpstreamReply>;
}

/// Gateway reached over HTTPS with reqwest
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpGateway {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            url: config.gateway_url.clone(),
        })
    }
}

#[async_trait]
impl ImageGateway for HttpGateway {
    async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<UpstreamReply> {
        debug!("Calling AI gateway at {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call AI gateway: {}", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read AI gateway response: {}", e))?;

        Ok(UpstreamReply { status, body })
    }
}

// ============================================================================
// Response Extraction
// ============================================================================

/// First generated image URL in a chat completion
pub fn extract_image(response: &Value) -> Option<String> {
    response
        .pointer("/choices/0/message/images/0/image_url/url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Text accompanying the image, if any
pub fn extract_text(response: &Value) -> Option<String> {
    let content = response.pointer("/choices/0/message/content")?;

    let text = match content {
        Value::String(s) => s.clone(),
        // Some providers return content as a list of typed parts
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
