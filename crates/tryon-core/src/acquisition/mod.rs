//! ============================================================================
//! Acquisition Module - Getting images into the app
//! ============================================================================
//! Two paths produce images:
//! - Upload: file picker or drag-and-drop, read into a data URL
//! - Camera: a live video stream feeding the AR overlay
//! ============================================================================

mod camera;
mod upload;

pub use camera::{
    CameraError, CameraSession, FacingMode, FrameSource, MediaDevices, MediaStream, MediaTrack,
    StillImageDevices, VideoConstraints, CAMERA_DENIED_MESSAGE,
};
pub use upload::{detect_mime, read_image, ImageSlot, SlotKind, UploadError, UploadSource};
