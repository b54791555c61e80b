//! ============================================================================
//! Proxy Module - Remote generation relay
//! ============================================================================
//! - gateway: the upstream multimodal model client
//! - handler: stateless request handling and status mapping
//! - server: the HTTP listener with CORS
//! ============================================================================

mod gateway;
mod handler;
mod server;

pub use gateway::{
    extract_image, extract_text, ChatRequest, HttpGateway, ImageGateway, UpstreamReply,
    TRYON_INSTRUCTION,
};
pub use handler::{ProxyResponse, TryOnProxy, CORS_HEADERS};
pub use server::{ProxyServer, ShutdownHandle};
