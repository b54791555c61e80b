//! ============================================================================
//! Upload - File picker and drag-and-drop image intake
//! ============================================================================
//! Both entry points converge on `read_image`, which reads the file
//! asynchronously and produces a data URL. Files that aren't `image/*` are
//! ignored rather than reported.
//! ============================================================================

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::DataUrl;

/// Errors reading an upload from disk
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the user handed over a file
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Click-to-browse selection
    Browse(PathBuf),
    /// Drag-and-drop; only the first file is considered
    Drop(Vec<PathBuf>),
}

impl UploadSource {
    fn path(&self) -> Option<&Path> {
        match self {
            UploadSource::Browse(path) => Some(path),
            UploadSource::Drop(paths) => paths.first().map(PathBuf::as_path),
        }
    }
}

/// Detect an image MIME type from the extension, falling back to magic bytes
pub fn detect_mime(path: &Path, bytes: &[u8]) -> Option<&'static str> {
    image::ImageFormat::from_path(path)
        .ok()
        .or_else(|| image::guess_format(bytes).ok())
        .map(|format| format.to_mime_type())
        .filter(|mime| mime.starts_with("image/"))
}

/// Read an image file into a data URL; `Ok(None)` for non-image files
pub async fn read_image(path: &Path) -> Result<Option<DataUrl>, UploadError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match detect_mime(path, &bytes) {
        Some(mime) => {
            debug!("Read {} ({}, {} bytes)", path.display(), mime, bytes.len());
            Ok(Some(DataUrl::from_bytes(mime, &bytes)))
        }
        None => {
            debug!("Ignoring non-image file {}", path.display());
            Ok(None)
        }
    }
}

/// Which image an upload zone holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Person,
    Outfit,
}

impl SlotKind {
    pub fn label(&self) -> &'static str {
        match self {
            SlotKind::Person => "Your Photo",
            SlotKind::Outfit => "Outfit Image",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            SlotKind::Person => "Upload a clear, front-facing photo",
            SlotKind::Outfit => "Upload the clothing you want to try",
        }
    }
}

/// One upload zone and the image it currently holds
#[derive(Debug, Clone)]
pub struct ImageSlot {
    kind: SlotKind,
    image: Option<DataUrl>,
}

impl ImageSlot {
    pub fn new(kind: SlotKind) -> Self {
        Self { kind, image: None }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn image(&self) -> Option<&DataUrl> {
        self.image.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    /// Store an already-read image
    pub fn set(&mut self, image: DataUrl) {
        self.image = Some(image);
    }

    /// Remove the stored image, returning it
    pub fn clear(&mut self) -> Option<DataUrl> {
        self.image.take()
    }

    /// Read from a browse or drop source; returns whether an image was stored
    pub async fn accept(&mut self, source: &UploadSource) -> Result<bool, UploadError> {
        let Some(path) = source.path() else {
            return Ok(false);
        };

        match read_image(path).await? {
            Some(image) => {
                info!("{} set from {}", self.kind.label(), path.display());
                self.image = Some(image);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
