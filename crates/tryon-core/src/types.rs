//! ============================================================================
//! Core Types for Virtual Try-On
//! ============================================================================
//! Defines the data structures shared by the proxy, the orchestrator and the
//! pages: data URLs, garments and their tints, and the try-on wire payloads.
//! The wire payloads use the camelCase JSON field names of the HTTP endpoint.
//! ============================================================================

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Body returned with 400 when either image is missing
pub const MISSING_IMAGES_MESSAGE: &str = "Both person and outfit images are required";

/// Body returned with 429 when the gateway is rate limiting
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again in a moment.";

/// Body returned with 402 when the gateway account is out of credits
pub const USAGE_LIMIT_MESSAGE: &str = "Usage limit reached. Please add credits to continue.";

/// Body returned with 422 when the model answered without an image
pub const NO_IMAGE_MESSAGE: &str =
    "Could not generate try-on image. The AI may need clearer images.";

/// Message used when the model returned an image but no text
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Virtual try-on completed successfully!";

/// File name of the downloaded result
pub const RESULT_FILE_NAME: &str = "virtual-tryon-result.png";

// ============================================================================
// Data URLs
// ============================================================================

/// Errors raised while parsing or decoding a data URL
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataUrlError {
    #[error("Not a data URL")]
    MissingScheme,

    #[error("Data URL has no payload separator")]
    MissingPayload,

    #[error("Data URL is not base64 encoded")]
    NotBase64,

    #[error("Invalid base64 payload: {0}")]
    InvalidPayload(String),
}

/// A base64 `data:` URL holding an encoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    mime: String,
    payload: String,
}

impl DataUrl {
    /// Build a data URL from raw bytes
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self {
            mime: mime.to_string(),
            payload: STANDARD.encode(bytes),
        }
    }

    /// MIME type declared in the URL header, e.g. `image/png`
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Whether the declared MIME type is an image type
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    /// Raw base64 payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Decode the payload back into bytes
    pub fn decode(&self) -> Result<Vec<u8>, DataUrlError> {
        STANDARD
            .decode(self.payload.trim())
            .map_err(|e| DataUrlError::InvalidPayload(e.to_string()))
    }
}

impl FromStr for DataUrl {
    type Err = DataUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("data:").ok_or(DataUrlError::MissingScheme)?;
        let (header, payload) = rest.split_once(',').ok_or(DataUrlError::MissingPayload)?;

        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default();
        if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(DataUrlError::NotBase64);
        }

        Ok(Self {
            mime: if mime.is_empty() {
                "text/plain".to_string()
            } else {
                mime.to_ascii_lowercase()
            },
            payload: payload.to_string(),
        })
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.payload)
    }
}

// ============================================================================
// Garments
// ============================================================================

/// RGBA tint painted over the torso region; channels 0-255, alpha 0.0-1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tint {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Tint {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Error for a color string that isn't `rgba()`, `rgb()` or hex
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid color '{0}'")]
pub struct InvalidTint(pub String);

impl FromStr for Tint {
    type Err = InvalidTint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTint(s.to_string());
        let trimmed = s.trim();

        if let Some(hex) = trimmed.strip_prefix('#') {
            let channel = |i: usize| {
                hex.get(i..i + 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(invalid)
            };
            return match hex.len() {
                6 => Ok(Tint::new(channel(0)?, channel(2)?, channel(4)?, 1.0)),
                8 => Ok(Tint::new(
                    channel(0)?,
                    channel(2)?,
                    channel(4)?,
                    channel(6)? as f32 / 255.0,
                )),
                _ => Err(invalid()),
            };
        }

        let (args, has_alpha) = if let Some(inner) = trimmed.strip_prefix("rgba(") {
            (inner, true)
        } else if let Some(inner) = trimmed.strip_prefix("rgb(") {
            (inner, false)
        } else {
            return Err(invalid());
        };
        let args = args.strip_suffix(')').ok_or_else(invalid)?;
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();

        let expected = if has_alpha { 4 } else { 3 };
        if parts.len() != expected {
            return Err(invalid());
        }

        let channel = |p: &str| p.parse::<u8>().map_err(|_| invalid());
        let alpha = if has_alpha {
            let a = parts[3].parse::<f32>().map_err(|_| invalid())?;
            if !(0.0..=1.0).contains(&a) {
                return Err(invalid());
            }
            a
        } else {
            1.0
        };

        Ok(Tint::new(
            channel(parts[0])?,
            channel(parts[1])?,
            channel(parts[2])?,
            alpha,
        ))
    }
}

impl fmt::Display for Tint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

impl Serialize for Tint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A selectable garment in the wardrobe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Garment {
    pub id: String,
    pub name: String,
    pub category: String,
    pub image_url: String,
    pub overlay_color: Tint,
}

// ============================================================================
// Try-On Wire Types
// ============================================================================

/// Body posted to the try-on endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnRequest {
    #[serde(default, deserialize_with = "string_or_missing")]
    pub person_image: Option<String>,
    #[serde(default, deserialize_with = "string_or_missing")]
    pub outfit_image: Option<String>,
}

/// Any non-string value (`null`, `false`, `0`, objects) counts as absent
fn string_or_missing<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

impl TryOnRequest {
    pub fn new(person_image: impl Into<String>, outfit_image: impl Into<String>) -> Self {
        Self {
            person_image: Some(person_image.into()),
            outfit_image: Some(outfit_image.into()),
        }
    }

    /// Both images, if both are present and non-empty
    pub fn images(&self) -> Option<(&str, &str)> {
        let person = self.person_image.as_deref().filter(|s| !s.is_empty())?;
        let outfit = self.outfit_image.as_deref().filter(|s| !s.is_empty())?;
        Some((person, outfit))
    }
}

/// Successful try-on response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnResult {
    pub result_image: String,
    pub message: String,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }
}

/// Error types for a try-on attempt, as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TryOnError {
    #[error("Please upload both your photo and an outfit image.")]
    MissingImages,

    #[error("A try-on is already in progress")]
    Busy,

    #[error("The try-on service did not respond within {0} seconds")]
    Timeout(u64),

    #[error("{message}")]
    Remote {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl TryOnError {
    /// Whether retrying later may succeed without new input
    pub fn is_retryable(&self) -> bool {
        match self {
            TryOnError::MissingImages | TryOnError::Busy => false,
            TryOnError::Remote { status, .. } => matches!(status, 429 | 422 | 500..=599),
            _ => true,
        }
    }
}
