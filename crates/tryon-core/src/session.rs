//! ============================================================================
//! Try-On Session - State behind the landing page
//! ============================================================================
//! Holds the person and outfit upload zones plus the orchestrator. Removing
//! either image invalidates any result produced from it.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::acquisition::{ImageSlot, SlotKind, UploadError, UploadSource};
use crate::orchestrator::{TryOnBackend, TryOnOrchestrator, TryOnState};
use crate::types::{DataUrl, TryOnError, TryOnResult};

pub struct TryOnSession {
    person: ImageSlot,
    outfit: ImageSlot,
    orchestrator: TryOnOrchestrator,
}

impl TryOnSession {
    pub fn new(orchestrator: TryOnOrchestrator) -> Self {
        Self {
            person: ImageSlot::new(SlotKind::Person),
            outfit: ImageSlot::new(SlotKind::Outfit),
            orchestrator,
        }
    }

    pub fn with_backend(backend: Arc<dyn TryOnBackend>, timeout: std::time::Duration) -> Self {
        Self::new(TryOnOrchestrator::new(backend, timeout))
    }

    pub fn orchestrator(&self) -> &TryOnOrchestrator {
        &self.orchestrator
    }

    pub fn slot(&self, kind: SlotKind) -> &ImageSlot {
        match kind {
            SlotKind::Person => &self.person,
            SlotKind::Outfit => &self.outfit,
        }
    }

    fn slot_mut(&mut self, kind: SlotKind) -> &mut ImageSlot {
        match kind {
            SlotKind::Person => &mut self.person,
            SlotKind::Outfit => &mut self.outfit,
        }
    }

    /// Load an upload into a zone; returns whether an image was stored
    pub async fn upload(&mut self, kind: SlotKind, source: &UploadSource) -> Result<bool, UploadError> {
        self.slot_mut(kind).accept(source).await
    }

    pub fn set_image(&mut self, kind: SlotKind, image: DataUrl) {
        self.slot_mut(kind).set(image);
    }

    /// Remove a zone's image and the result derived from it
    pub fn remove(&mut self, kind: SlotKind) {
        if self.slot_mut(kind).clear().is_some() {
            info!("{} removed", kind.label());
            self.orchestrator.reset();
        }
    }

    /// Both images present and nothing pending
    pub fn can_try_on(&self) -> bool {
        !self.person.is_empty() && !self.outfit.is_empty() && !self.orchestrator.is_processing()
    }

    pub async fn try_on(&self) -> Result<TryOnResult, TryOnError> {
        let person = self.person.image().map(DataUrl::to_string).unwrap_or_default();
        let outfit = self.outfit.image().map(DataUrl::to_string).unwrap_or_default();
        self.orchestrator.perform_try_on(&person, &outfit).await
    }

    pub fn result(&self) -> Option<TryOnResult> {
        match self.orchestrator.state() {
            TryOnState::Ready(result) => Some(result),
            _ => None,
        }
    }

    pub fn reset(&self) {
        self.orchestrator.reset();
    }
}

/// Write a result image to disk as PNG, re-encoding other formats
pub fn save_result_png(result_image: &str, path: &Path) -> Result<()> {
    let url: DataUrl = result_image
        .parse()
        .map_err(|e| anyhow!("Result is not a data URL: {}", e))?;
    let bytes = url
        .decode()
        .map_err(|e| anyhow!("Failed to decode result image: {}", e))?;

    if url.mime() == "image/png" {
        std::fs::write(path, &bytes)
            .map_err(|e| anyhow!("Failed to save {}: {}", path.display(), e))?;
    } else {
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| anyhow!("Failed to decode {} result: {}", url.mime(), e))?;
        let mut png = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| anyhow!("Failed to encode PNG: {}", e))?;
        std::fs::write(path, &png)
            .map_err(|e| anyhow!("Failed to save {}: {}", path.display(), e))?;
    }

    info!("Result saved to {}", path.display());
    Ok(())
}
