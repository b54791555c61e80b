//! ============================================================================
//! Camera - Live video streams for the virtual wardrobe
//! ============================================================================
//! A `CameraSession` owns at most one `MediaStream` and at most one overlay
//! render loop. Every exit path (stop, facing switch, drop) stops all tracks
//! and cancels the loop; stopping an inactive session does nothing.
//! ============================================================================

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::GarmentCatalog;
use crate::overlay::{RenderLoop, FRAME_INTERVAL};
use crate::types::Garment;

/// Shown when the camera can't be opened
pub const CAMERA_DENIED_MESSAGE: &str =
    "Unable to access camera. Please grant camera permissions.";

/// Ideal capture size (portrait)
const IDEAL_WIDTH: u32 = 720;
const IDEAL_HEIGHT: u32 = 1280;

/// Errors opening a camera or driving a session
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown garment: {0}")]
    UnknownGarment(String),
}

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera (selfie)
    #[default]
    User,
    /// Back camera
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

/// Constraints passed when requesting a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl VideoConstraints {
    pub fn new(facing_mode: FacingMode) -> Self {
        Self {
            facing_mode,
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        }
    }
}

/// Supplies the most recent video frame of a stream
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Option<RgbaImage>;
}

/// A single track of a media stream; clones share the live flag
#[derive(Debug, Clone)]
pub struct MediaTrack {
    label: String,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track, releasing the device. Returns whether it was live.
    pub fn stop(&self) -> bool {
        self.live.swap(false, Ordering::SeqCst)
    }
}

/// A granted camera stream
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
    source: Arc<dyn FrameSource>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>, source: Arc<dyn FrameSource>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn is_live(&self) -> bool {
        self.live_track_count() > 0
    }

    /// Stop every track; returns how many were still live
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }

    /// Current frame, or `None` once the stream has ended
    pub fn read_frame(&self) -> Option<RgbaImage> {
        if !self.is_live() {
            return None;
        }
        self.source.current_frame()
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks)
            .finish()
    }
}

/// Access to camera hardware
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: &VideoConstraints)
        -> Result<MediaStream, CameraError>;
}

// ============================================================================
// Still-Image Device
// ============================================================================

/// Serves a still photograph as a live camera feed
pub struct StillImageDevices {
    photo: Arc<RgbaImage>,
}

impl StillImageDevices {
    pub fn new(photo: RgbaImage) -> Self {
        Self {
            photo: Arc::new(photo),
        }
    }

    /// Load the photograph from disk
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let photo = image::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open camera source {}: {}", path.display(), e))?
            .to_rgba8();
        Ok(Self::new(photo))
    }
}

struct StillFrame(RgbaImage);

impl FrameSource for StillFrame {
    fn current_frame(&self) -> Option<RgbaImage> {
        Some(self.0.clone())
    }
}

#[async_trait]
impl MediaDevices for StillImageDevices {
    async fn get_user_media(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<MediaStream, CameraError> {
        let (w, h) = self.photo.dimensions();
        if w == 0 || h == 0 {
            return Err(CameraError::Unavailable("camera source is empty".to_string()));
        }

        let mut frame = if w > constraints.ideal_width || h > constraints.ideal_height {
            let scale = f64::min(
                constraints.ideal_width as f64 / w as f64,
                constraints.ideal_height as f64 / h as f64,
            );
            let nw = ((w as f64 * scale).round() as u32).max(1);
            let nh = ((h as f64 * scale).round() as u32).max(1);
            image::imageops::resize(&*self.photo, nw, nh, image::imageops::FilterType::Triangle)
        } else {
            (*self.photo).clone()
        };

        // Front cameras preview mirrored
        if constraints.facing_mode == FacingMode::User {
            image::imageops::flip_horizontal_in_place(&mut frame);
        }

        let track = MediaTrack::new(format!("still camera ({})", constraints.facing_mode.as_str()));
        Ok(MediaStream::new(vec![track], Arc::new(StillFrame(frame))))
    }
}

// ============================================================================
// Camera Session
// ============================================================================

/// State of the wardrobe page: stream, facing mode, selected garment, overlay
///
/// Methods that may start the render loop spawn onto the current Tokio runtime.
pub struct CameraSession {
    devices: Arc<dyn MediaDevices>,
    catalog: Arc<GarmentCatalog>,
    facing: FacingMode,
    stream: Option<MediaStream>,
    error: Option<String>,
    selection: watch::Sender<Option<Garment>>,
    canvas: Arc<watch::Sender<Option<Arc<RgbaImage>>>>,
    render_loop: Option<RenderLoop>,
    loops_started: usize,
    frame_interval: Duration,
}

impl CameraSession {
    pub fn new(devices: Arc<dyn MediaDevices>, catalog: Arc<GarmentCatalog>) -> Self {
        Self {
            devices,
            catalog,
            facing: FacingMode::default(),
            stream: None,
            error: None,
            selection: watch::Sender::new(None),
            canvas: Arc::new(watch::Sender::new(None)),
            render_loop: None,
            loops_started: 0,
            frame_interval: FRAME_INTERVAL,
        }
    }

    pub fn with_facing_mode(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn catalog(&self) -> &GarmentCatalog {
        &self.catalog
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// User-facing message from the last failed start
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn live_track_count(&self) -> usize {
        self.stream.as_ref().map_or(0, MediaStream::live_track_count)
    }

    pub fn is_rendering(&self) -> bool {
        self.render_loop.as_ref().is_some_and(|l| !l.is_finished())
    }

    /// Number of render loops spawned over the session's lifetime
    pub fn render_loops_started(&self) -> usize {
        self.loops_started
    }

    pub fn selected(&self) -> Option<Garment> {
        self.selection.borrow().clone()
    }

    /// Receiver for composited frames
    pub fn subscribe_canvas(&self) -> watch::Receiver<Option<Arc<RgbaImage>>> {
        self.canvas.subscribe()
    }

    /// Composited frame while the overlay runs, else the raw camera frame
    pub fn snapshot(&self) -> Option<Arc<RgbaImage>> {
        if self.is_rendering() {
            if let Some(frame) = self.canvas.borrow().clone() {
                return Some(frame);
            }
        }
        self.stream
            .as_ref()
            .and_then(MediaStream::read_frame)
            .map(Arc::new)
    }

    /// Open the camera with the current facing mode
    pub async fn start(&mut self) -> Result<(), CameraError> {
        if self.is_active() {
            return Ok(());
        }
        self.error = None;

        let constraints = VideoConstraints::new(self.facing);
        match self.devices.get_user_media(&constraints).await {
            Ok(stream) => {
                info!(
                    "Camera started ({}, {} tracks)",
                    self.facing.as_str(),
                    stream.tracks().len()
                );
                self.stream = Some(stream);
                self.sync_render_loop();
                Ok(())
            }
            Err(e) => {
                warn!("Camera error: {}", e);
                self.error = Some(CAMERA_DENIED_MESSAGE.to_string());
                Err(e)
            }
        }
    }

    /// Stop the render loop and every track. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(render_loop) = self.render_loop.take() {
            render_loop.cancel();
        }
        if let Some(stream) = self.stream.take() {
            let stopped = stream.stop_all();
            info!("Camera stopped ({} tracks released)", stopped);
        }
        self.canvas.send_replace(None);
    }

    /// Tear down the stream and reopen it with the other facing mode
    pub async fn switch_facing(&mut self) -> Result<(), CameraError> {
        let was_active = self.is_active();
        self.stop();
        self.facing = self.facing.toggled();
        debug!("Facing mode switched to {}", self.facing.as_str());

        if was_active {
            self.start().await
        } else {
            Ok(())
        }
    }

    /// Select a garment by catalog id
    pub fn select_garment(&mut self, id: &str) -> Result<Garment, CameraError> {
        let garment = self
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| CameraError::UnknownGarment(id.to_string()))?;

        info!("Trying on: {}", garment.name);
        self.selection.send_replace(Some(garment.clone()));
        self.sync_render_loop();
        Ok(garment)
    }

    pub fn clear_selection(&mut self) {
        self.selection.send_replace(None);
        self.sync_render_loop();
    }

    /// Keep exactly one render loop while active with a selection, none otherwise
    fn sync_render_loop(&mut self) {
        let wanted = self.is_active() && self.selection.borrow().is_some();

        if !wanted {
            if let Some(render_loop) = self.render_loop.take() {
                render_loop.cancel();
            }
            return;
        }

        if self.is_rendering() {
            return;
        }

        if let Some(stream) = self.stream.clone() {
            self.render_loop = Some(RenderLoop::spawn(
                stream,
                self.selection.subscribe(),
                self.canvas.clone(),
                self.frame_interval,
            ));
            self.loops_started += 1;
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::atomic::AtomicUsize;

    struct TestDevices {
        deny: bool,
        requests: AtomicUsize,
        last_facing: std::sync::Mutex<Option<FacingMode>>,
    }

    impl TestDevices {
        fn new(deny: bool) -> Arc<Self> {
            Arc::new(Self {
                deny,
                requests: AtomicUsize::new(0),
                last_facing: std::sync::Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl MediaDevices for TestDevices {
        async fn get_user_media(
            &self,
            constraints: &VideoConstraints,
        ) -> Result<MediaStream, CameraError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            *self.last_facing.lock().unwrap() = Some(constraints.facing_mode);
            if self.deny {
                return Err(CameraError::PermissionDenied("NotAllowedError".to_string()));
            }
            let frame = RgbaImage::from_pixel(40, 80, Rgba([0, 0, 0, 255]));
            Ok(MediaStream::new(
                vec![MediaTrack::new("video"), MediaTrack::new("video-2")],
                Arc::new(StillFrame(frame)),
            ))
        }
    }

    fn session(devices: Arc<TestDevices>) -> CameraSession {
        CameraSession::new(devices, Arc::new(GarmentCatalog::builtin()))
            .with_frame_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_stop_releases_all_tracks() {
        let mut camera = session(TestDevices::new(false));
        camera.start().await.unwrap();
        assert!(camera.is_active());
        assert_eq!(camera.live_track_count(), 2);

        let tracks = camera.stream.as_ref().unwrap().tracks().to_vec();
        camera.stop();
        assert!(!camera.is_active());
        assert_eq!(camera.live_track_count(), 0);
        assert!(tracks.iter().all(|t| !t.is_live()));

        // Second stop is a no-op
        camera.stop();
        assert!(!camera.is_active());
    }

    #[tokio::test]
    async fn test_denied_camera_is_recoverable() {
        let devices = TestDevices::new(true);
        let mut camera = session(devices.clone());

        let err = camera.start().await.unwrap_err();
        assert!(matches!(err, CameraError::PermissionDenied(_)));
        assert!(!camera.is_active());
        assert_eq!(camera.error(), Some(CAMERA_DENIED_MESSAGE));

        camera.stop();
        assert_eq!(devices.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_switch_facing_restarts_stream() {
        let devices = TestDevices::new(false);
        let mut camera = session(devices.clone());
        camera.start().await.unwrap();
        let old_tracks = camera.stream.as_ref().unwrap().tracks().to_vec();

        camera.switch_facing().await.unwrap();
        assert_eq!(camera.facing_mode(), FacingMode::Environment);
        assert!(old_tracks.iter().all(|t| !t.is_live()));
        assert_eq!(camera.live_track_count(), 2);
        assert_eq!(
            *devices.last_facing.lock().unwrap(),
            Some(FacingMode::Environment)
        );
    }

    #[tokio::test]
    async fn test_switch_facing_while_inactive_does_not_open() {
        let devices = TestDevices::new(false);
        let mut camera = session(devices.clone());
        camera.switch_facing().await.unwrap();
        assert_eq!(camera.facing_mode(), FacingMode::Environment);
        assert_eq!(devices.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reselection_keeps_single_loop() {
        let mut camera = session(TestDevices::new(false));
        camera.start().await.unwrap();
        assert!(!camera.is_rendering());

        camera.select_garment("tshirt-white").unwrap();
        camera.select_garment("sweater-red").unwrap();
        camera.select_garment("blazer-navy").unwrap();
        assert!(camera.is_rendering());
        assert_eq!(camera.render_loops_started(), 1);
        assert_eq!(camera.selected().unwrap().id, "blazer-navy");

        camera.stop();
        assert!(!camera.is_rendering());
    }

    #[tokio::test]
    async fn test_reselection_replaces_tint() {
        let mut camera = session(TestDevices::new(false));
        camera.start().await.unwrap();
        let mut canvas = camera.subscribe_canvas();
        // Upper half of the torso box in a 40x80 frame
        let torso = |frame: &Option<Arc<RgbaImage>>| frame.as_ref().map(|f| *f.get_pixel(20, 28));
        let black = Rgba([0, 0, 0, 255]);

        camera.select_garment("tshirt-white").unwrap();
        let white = {
            let frame = tokio::time::timeout(
                Duration::from_secs(2),
                canvas.wait_for(|f| torso(f).is_some_and(|p| p != black)),
            )
            .await
            .unwrap()
            .unwrap();
            torso(&*frame).unwrap()
        };

        camera.select_garment("sweater-red").unwrap();
        let red = {
            let frame = tokio::time::timeout(
                Duration::from_secs(2),
                canvas.wait_for(|f| torso(f).is_some_and(|p| p != black && p != white)),
            )
            .await
            .unwrap()
            .unwrap();
            torso(&*frame).unwrap()
        };

        let ([wr, wg, wb, _], [rr, rg, rb, _]) = (white.0, red.0);
        assert!(wr == wg && wg == wb);
        assert!(rr > rg && rr > rb);
        assert_eq!(camera.render_loops_started(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_tracks() {
        let mut camera = session(TestDevices::new(false));
        camera.start().await.unwrap();
        camera.select_garment("hoodie-gray").unwrap();
        let tracks = camera.stream.as_ref().unwrap().tracks().to_vec();
        assert!(tracks.iter().all(MediaTrack::is_live));

        drop(camera);
        assert!(tracks.iter().all(|t| !t.is_live()));
    }

    #[tokio::test]
    async fn test_unknown_garment_rejected() {
        let mut camera = session(TestDevices::new(false));
        assert_eq!(
            camera.select_garment("cape").unwrap_err(),
            CameraError::UnknownGarment("cape".to_string())
        );
        assert!(camera.selected().is_none());
    }

    #[tokio::test]
    async fn test_still_image_mirrors_front_camera() {
        let mut photo = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        photo.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let devices = StillImageDevices::new(photo);

        let front = devices
            .get_user_media(&VideoConstraints::new(FacingMode::User))
            .await
            .unwrap();
        let frame = front.read_frame().unwrap();
        assert_eq!(frame.get_pixel(3, 0), &Rgba([255, 0, 0, 255]));

        let back = devices
            .get_user_media(&VideoConstraints::new(FacingMode::Environment))
            .await
            .unwrap();
        assert_eq!(back.read_frame().unwrap().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));

        back.stop_all();
        assert!(back.read_frame().is_none());
    }

    #[tokio::test]
    async fn test_still_image_downscales_to_constraints() {
        let devices = StillImageDevices::new(RgbaImage::new(1440, 1440));
        let stream = devices
            .get_user_media(&VideoConstraints::new(FacingMode::Environment))
            .await
            .unwrap();
        assert_eq!(stream.read_frame().unwrap().dimensions(), (720, 720));
    }
}
