//! ============================================================================
//! Configuration - Environment-driven settings for proxy and client
//! ============================================================================
//! Values are read from the process environment (the binary loads `.env`
//! first). CLI flags override individual fields after loading.
//! ============================================================================

use std::net::SocketAddr;
use std::time::Duration;

/// Default AI gateway chat-completions endpoint
pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";

/// Default multimodal model producing image + text output
pub const DEFAULT_GATEWAY_MODEL: &str = "google/gemini-3-pro-image-preview";

/// Default bind address for the proxy server
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Default proxy URL used by the try-on client
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787/";

/// Upstream call timeout; kept under the client timeout so the proxy answers first
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 110;

/// Client-side bound on a single try-on
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Largest accepted request body (two base64 photos)
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Errors for malformed configuration values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Settings for the remote generation proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream credential; absence fails every try-on with a generic 500
    pub api_key: Option<String>,
    pub gateway_url: String,
    pub model: String,
    pub bind_addr: SocketAddr,
    pub upstream_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            model: DEFAULT_GATEWAY_MODEL.to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ProxyConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_key: get("AI_GATEWAY_API_KEY"),
            gateway_url: get("AI_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            model: get("AI_GATEWAY_MODEL").unwrap_or(defaults.model),
            bind_addr: parse_var("TRYON_BIND_ADDR", get("TRYON_BIND_ADDR"))?
                .unwrap_or(defaults.bind_addr),
            upstream_timeout: parse_var("TRYON_UPSTREAM_TIMEOUT_SECS", get("TRYON_UPSTREAM_TIMEOUT_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            max_body_bytes: parse_var("TRYON_MAX_BODY_BYTES", get("TRYON_MAX_BODY_BYTES"))?
                .unwrap_or(defaults.max_body_bytes),
        })
    }
}

/// Settings for the try-on client talking to the proxy
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub proxy_url: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        Ok(Self {
            proxy_url: get("TRYON_PROXY_URL").unwrap_or(defaults.proxy_url),
            request_timeout: parse_var("TRYON_REQUEST_TIMEOUT_SECS", get("TRYON_REQUEST_TIMEOUT_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { var, value: v })
        })
        .transpose()
}
