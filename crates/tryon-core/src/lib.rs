//! ============================================================================
//! TRYON-CORE: Virtual Try-On Engine
//! ============================================================================
//! This crate handles all logic behind the try-on and wardrobe pages:
//! - Image acquisition from files and camera streams
//! - The static garment catalog
//! - The simulated AR overlay renderer
//! - The try-on orchestrator and its HTTP backend
//! - The proxy relaying try-on requests to the AI gateway
//! ============================================================================

pub mod acquisition;
pub mod catalog;
pub mod config;
pub mod orchestrator;
pub mod overlay;
pub mod proxy;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use acquisition::{CameraSession, FacingMode, ImageSlot, MediaDevices, StillImageDevices};
pub use catalog::GarmentCatalog;
pub use config::{ClientConfig, ProxyConfig};
pub use orchestrator::{HttpTryOnBackend, TryOnBackend, TryOnOrchestrator, TryOnState};
pub use proxy::{HttpGateway, ImageGateway, ProxyServer, TryOnProxy};
pub use session::TryOnSession;
pub use types::*;
