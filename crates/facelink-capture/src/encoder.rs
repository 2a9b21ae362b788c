//! Lossy still encoding (outbound) and image decoding (inbound).

use bytes::Bytes;
use facelink_core::FaceLinkError;
use image::codecs::jpeg;
use image::{DynamicImage, ExtendedColorType, RgbaImage};
use tracing::debug;

use crate::VideoFrame;

pub trait FrameEncoder: Send + Sync {
    fn encode(&self, image: &RgbaImage) -> Result<Bytes, FaceLinkError>;

    /// MIME type of the encoded output.
    fn mime(&self) -> &'static str;
}

/// JPEG encoder. Quality is a fraction in (0, 1].
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: f32) -> Self {
        let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
        Self { quality }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&self, image: &RgbaImage) -> Result<Bytes, FaceLinkError> {
        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        let mut out = Vec::with_capacity((rgb.width() * rgb.height() / 4) as usize);
        jpeg::JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| FaceLinkError::Encode { reason: e.to_string() })?;
        debug!(
            "encoded {}x{} jpeg q={} ({} bytes)",
            rgb.width(),
            rgb.height(),
            self.quality,
            out.len()
        );
        Ok(Bytes::from(out))
    }

    fn mime(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Decode any supported image payload into a frame.
pub fn decode_image(data: &[u8]) -> Result<VideoFrame, FaceLinkError> {
    let image = image::load_from_memory(data)
        .map_err(|e| FaceLinkError::Encode { reason: format!("decode: {}", e) })?
        .to_rgba8();
    Ok(VideoFrame::new(image, 0))
}
