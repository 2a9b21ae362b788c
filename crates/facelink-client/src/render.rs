//! Paints processed frames from the channel.
//!
//! Replies are decoded off the owner's task; [`RenderSink::paint`] takes the
//! decoded result. The owner releases the capture loop for every reply,
//! decodable or not.

use facelink_capture::VideoFrame;
use facelink_core::FaceLinkError;
use image::RgbaImage;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Painted { width: u32, height: u32, resized: bool },
    DecodeFailed(String),
}

/// Output surface for processed frames.
#[derive(Default)]
pub struct RenderSink {
    surface: Option<RgbaImage>,
    frames_painted: u64,
}

impl RenderSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest painted frame, `None` until the first reply.
    pub fn surface(&self) -> Option<&RgbaImage> {
        self.surface.as_ref()
    }

    pub fn frames_painted(&self) -> u64 {
        self.frames_painted
    }

    pub fn paint(&mut self, decoded: Result<VideoFrame, FaceLinkError>) -> RenderOutcome {
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                warn!("undecodable frame from channel: {}", e);
                return RenderOutcome::DecodeFailed(e.to_string());
            }
        };
        let (width, height) = (frame.width(), frame.height());
        let resized = match self.surface.as_mut() {
            Some(surface) if surface.dimensions() == (width, height) => {
                surface.copy_from_slice(frame.image.as_raw());
                false
            }
            _ => {
                debug!("render surface resized to {}x{}", width, height);
                self.surface = Some(frame.image);
                true
            }
        };
        self.frames_painted += 1;
        RenderOutcome::Painted { width, height, resized }
    }
}
