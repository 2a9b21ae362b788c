//! facelink-capture: frame sources and image plumbing for the FaceLink client.
//!
//! # Capabilities
//!
//! | Trait | Implementations | Role |
//! |-------|-----------------|------|
//! | [`MediaSource`] | [`ImageDirSource`], [`SyntheticSource`] | live video frames at native resolution |
//! | [`FrameEncoder`] | [`JpegEncoder`] | lossy still encoding for the channel and detection |
//! | [`DurationProbe`] | [`FfprobeDurationProbe`] | media duration for ETA estimation |
//!
//! # Flow
//!
//! ```text
//! MediaSource::current_frame() ──► CaptureCanvas::draw (fixed width, keep aspect)
//!                                        │
//!                                        ▼
//!                               FrameEncoder::encode ──► Bytes (JPEG)
//! ```

pub mod dir_source;
pub mod encoder;
pub mod probe;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use facelink_core::FaceLinkError;
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

pub use dir_source::ImageDirSource;
pub use encoder::{decode_image, FrameEncoder, JpegEncoder};
pub use probe::{DurationProbe, FfprobeDurationProbe, FixedDuration};

// ── Public types ──────────────────────────────────────────────────────────────

/// A raw video frame (RGBA, 4 bytes per pixel).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub image: RgbaImage,
    /// Milliseconds since the source started.
    pub pts_ms: u64,
}

impl VideoFrame {
    pub fn new(image: RgbaImage, pts_ms: u64) -> Self {
        Self { image, pts_ms }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A live video source (camera, file sequence, test pattern).
pub trait MediaSource: Send {
    /// Acquire the source. Fails with a capability error when access is denied.
    fn start(&mut self) -> Result<(), FaceLinkError>;

    fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// The current frame at native resolution, or `None` if none is ready.
    fn current_frame(&mut self) -> Option<VideoFrame>;
}

/// A [`MediaSource`] shared between the engine and blocking capture work.
#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<Box<dyn MediaSource>>>,
}

impl SharedSource {
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        Self { inner: Arc::new(Mutex::new(source)) }
    }

    /// Run `f` with exclusive access to the source.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn MediaSource) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **guard)
    }

    pub fn is_active(&self) -> bool {
        self.with(|source| source.is_active())
    }

    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.with(|source| source.current_frame())
    }
}

// ── CaptureCanvas ─────────────────────────────────────────────────────────────

/// Output size for drawing a `src_w × src_h` frame at `target_w` wide.
///
/// Height keeps the aspect ratio, rounded, never below 1. A zero source size
/// falls back to 16:9.
pub fn scaled_size(src_w: u32, src_h: u32, target_w: u32) -> (u32, u32) {
    let src_w = if src_w == 0 { target_w } else { src_w };
    let src_h = if src_h == 0 { target_w as f64 * 9.0 / 16.0 } else { src_h as f64 };
    let scale = target_w as f64 / src_w as f64;
    let h = (src_h * scale).round().max(1.0) as u32;
    (target_w, h)
}

/// Intermediate buffer the capture loop draws each frame onto.
///
/// Frames already at the output size are copied into the existing buffer.
/// Downscaled frames get a freshly allocated buffer each draw.
pub struct CaptureCanvas {
    target_width: u32,
    buffer: RgbaImage,
}

impl CaptureCanvas {
    pub fn new(target_width: u32) -> Self {
        Self { target_width: target_width.max(1), buffer: RgbaImage::new(0, 0) }
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    /// Draw `frame` onto the canvas at the target width.
    pub fn draw(&mut self, frame: &VideoFrame) -> &RgbaImage {
        let (w, h) = scaled_size(frame.width(), frame.height(), self.target_width);
        if frame.width() == w && frame.height() == h {
            if self.buffer.dimensions() == (w, h) {
                self.buffer.copy_from_slice(frame.image.as_raw());
            } else {
                self.buffer = frame.image.clone();
            }
        } else {
            self.buffer = image::imageops::resize(&frame.image, w, h, FilterType::Triangle);
        }
        &self.buffer
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }
}

// ── SyntheticSource ───────────────────────────────────────────────────────────

/// Moving test pattern at a fixed resolution.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    started: Option<Instant>,
    frame_no: u32,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1), started: None, frame_no: 0 }
    }
}

impl MediaSource for SyntheticSource {
    fn start(&mut self) -> Result<(), FaceLinkError> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.started = None;
    }

    fn is_active(&self) -> bool {
        self.started.is_some()
    }

    fn current_frame(&mut self) -> Option<VideoFrame> {
        let started = self.started?;
        self.frame_no = self.frame_no.wrapping_add(1);
        let shift = self.frame_no;
        let image = RgbaImage::from_fn(self.width, self.height, |x, y| {
            Rgba([(x.wrapping_add(shift) % 256) as u8, (y % 256) as u8, 128, 255])
        });
        Some(VideoFrame::new(image, started.elapsed().as_millis() as u64))
    }
}
