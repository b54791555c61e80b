//! ============================================================================
//! AR Overlay - Simulated garment tint over the live camera feed
//! ============================================================================
//! Each tick draws the current video frame and, with a garment selected,
//! paints a rounded rectangle over a fixed torso box:
//! - top at 25% of the height, 40% of the height tall
//! - horizontally centered, 60% of the width wide
//! - corner radius 20 px
//! The fill is a vertical gradient in the garment tint: solid for the upper
//! half, fading to transparent at the bottom, drawn at 60% global opacity
//! with source-over compositing. The box is frame-relative, not body-tracked.
//! ============================================================================

use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::acquisition::MediaStream;
use crate::types::{Garment, Tint};

/// One display refresh at 60 Hz
pub const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Shortest tick the render loop accepts
const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

const TORSO_TOP: f32 = 0.25;
const TORSO_HEIGHT: f32 = 0.4;
const TORSO_LEFT: f32 = 0.2;
const TORSO_WIDTH: f32 = 0.6;
const CORNER_RADIUS: f32 = 20.0;
const GLOBAL_ALPHA: f32 = 0.6;

/// The painted torso region, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsoBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub radius: f32,
}

impl TorsoBox {
    pub fn for_frame(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let (bw, bh) = (w * TORSO_WIDTH, h * TORSO_HEIGHT);
        Self {
            x: w * TORSO_LEFT,
            y: h * TORSO_TOP,
            width: bw,
            height: bh,
            radius: CORNER_RADIUS.min(bw / 2.0).min(bh / 2.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Whether a point lies inside the rounded rectangle
    pub fn contains(&self, px: f32, py: f32) -> bool {
        if px < self.x || px > self.right() || py < self.y || py > self.bottom() {
            return false;
        }

        let r = self.radius;
        let cx = px.clamp(self.x + r, self.right() - r);
        let cy = py.clamp(self.y + r, self.bottom() - r);
        let (dx, dy) = (px - cx, py - cy);
        dx * dx + dy * dy <= r * r
    }

    /// Gradient strength at `py`: 1.0 through the midpoint, then linear to 0.0
    fn gradient(&self, py: f32) -> f32 {
        if self.height <= 0.0 {
            return 0.0;
        }
        let t = ((py - self.y) / self.height).clamp(0.0, 1.0);
        if t <= 0.5 {
            1.0
        } else {
            2.0 * (1.0 - t)
        }
    }
}

/// Paint the garment tint over the torso box of `frame` in place
pub fn composite_overlay(frame: &mut RgbaImage, tint: Tint) {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let torso = TorsoBox::for_frame(w, h);

    let y0 = torso.y.floor().max(0.0) as u32;
    let y1 = (torso.bottom().ceil() as u32).min(h);
    let x0 = torso.x.floor().max(0.0) as u32;
    let x1 = (torso.right().ceil() as u32).min(w);

    for y in y0..y1 {
        let cy = y as f32 + 0.5;
        let alpha = tint.a * torso.gradient(cy) * GLOBAL_ALPHA;
        if alpha <= 0.0 {
            continue;
        }

        for x in x0..x1 {
            if torso.contains(x as f32 + 0.5, cy) {
                let pixel = frame.get_pixel_mut(x, y);
                *pixel = source_over(*pixel, tint, alpha);
            }
        }
    }
}

fn source_over(dst: Rgba<u8>, tint: Tint, alpha: f32) -> Rgba<u8> {
    let blend = |src: u8, dst: u8| {
        (src as f32 * alpha + dst as f32 * (1.0 - alpha))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = alpha + dst_a * (1.0 - alpha);

    Rgba([
        blend(tint.r, dst[0]),
        blend(tint.g, dst[1]),
        blend(tint.b, dst[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Draw one canvas frame: the video frame, plus the overlay if a garment is set
pub fn render_frame(video: RgbaImage, garment: Option<&Garment>) -> RgbaImage {
    let mut canvas = video;
    if let Some(garment) = garment {
        composite_overlay(&mut canvas, garment.overlay_color);
    }
    canvas
}

/// Repeating per-frame render task bound to a camera stream
///
/// The loop ends by itself once every track of the stream has stopped, and is
/// aborted on `cancel` or drop. Garment changes arrive through the selection
/// channel, so re-selecting never needs a second loop.
pub struct RenderLoop {
    handle: JoinHandle<()>,
}

impl RenderLoop {
    pub fn spawn(
        stream: MediaStream,
        selection: watch::Receiver<Option<Garment>>,
        canvas: Arc<watch::Sender<Option<Arc<RgbaImage>>>>,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_FRAME_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut frames: u64 = 0;

            loop {
                ticker.tick().await;

                let Some(video) = stream.read_frame() else {
                    debug!("Stream {} ended after {} frames", stream.id(), frames);
                    break;
                };

                let garment = selection.borrow().clone();
                let frame = render_frame(video, garment.as_ref());
                canvas.send_replace(Some(Arc::new(frame)));
                frames += 1;
            }
        });

        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
