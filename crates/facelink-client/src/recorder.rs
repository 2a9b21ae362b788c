//! Records the render surface into a single downloadable file.
//!
//! Each sample is encoded off the owner's task as a [`ChunkJob`]. Chunks that
//! finish after the session stopped are dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use facelink_capture::{FrameEncoder, JpegEncoder};
use facelink_core::resource::release;
use facelink_core::{BlobStore, FaceLinkError, RecordingState, ResourceHandle};
use image::RgbaImage;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Container/codec choices, most preferred first in [`RecordingFormat::PREFERENCE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingFormat {
    WebmVp9,
    WebmVp8,
    Mjpeg,
}

impl RecordingFormat {
    pub const PREFERENCE: [RecordingFormat; 3] = [Self::WebmVp9, Self::WebmVp8, Self::Mjpeg];

    pub fn mime(&self) -> &'static str {
        match self {
            Self::WebmVp9 => "video/webm;codecs=vp9",
            Self::WebmVp8 => "video/webm;codecs=vp8",
            Self::Mjpeg => "video/x-motion-jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::WebmVp9 | Self::WebmVp8 => "webm",
            Self::Mjpeg => "mjpeg",
        }
    }

    /// First format in preference order that `supports` accepts.
    pub fn select(supports: impl Fn(RecordingFormat) -> bool) -> Option<RecordingFormat> {
        Self::PREFERENCE.into_iter().find(|f| supports(*f))
    }
}

/// Turns sampled surfaces into chunks and chunks into one file.
pub trait Muxer: Send + Sync {
    fn supports(&self, format: RecordingFormat) -> bool;

    fn encode_chunk(&self, frame: &RgbaImage) -> Result<Bytes, FaceLinkError>;

    fn finish(&self, format: RecordingFormat, chunks: Vec<Bytes>) -> Bytes;
}

/// Motion-JPEG: every chunk is a JPEG, the file is their concatenation.
pub struct MjpegMuxer {
    encoder: JpegEncoder,
}

impl MjpegMuxer {
    pub fn new(quality: f32) -> Self {
        Self { encoder: JpegEncoder::new(quality) }
    }
}

impl Default for MjpegMuxer {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl Muxer for MjpegMuxer {
    fn supports(&self, format: RecordingFormat) -> bool {
        format == RecordingFormat::Mjpeg
    }

    fn encode_chunk(&self, frame: &RgbaImage) -> Result<Bytes, FaceLinkError> {
        self.encoder.encode(frame)
    }

    fn finish(&self, _format: RecordingFormat, chunks: Vec<Bytes>) -> Bytes {
        let total = chunks.iter().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(total);
        for chunk in chunks {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }
}

/// One sampled surface to encode. Blocking.
pub struct ChunkJob {
    session: u64,
    muxer: Arc<dyn Muxer>,
    frame: RgbaImage,
}

impl fmt::Debug for ChunkJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkJob")
            .field("session", &self.session)
            .field("dimensions", &self.frame.dimensions())
            .finish()
    }
}

impl ChunkJob {
    pub fn run(self) -> EncodedChunk {
        EncodedChunk { session: self.session, result: self.muxer.encode_chunk(&self.frame) }
    }
}

#[derive(Debug)]
pub struct EncodedChunk {
    session: u64,
    result: Result<Bytes, FaceLinkError>,
}

pub struct Recorder {
    state: RecordingState,
    format: Option<RecordingFormat>,
    chunks: Vec<Bytes>,
    result: Option<ResourceHandle>,
    muxer: Arc<dyn Muxer>,
    interval: Duration,
    next_sample: Option<Instant>,
    /// Bumped on every start; chunks carry the session they were sampled in.
    session: u64,
    encoding: bool,
}

impl Recorder {
    pub fn new(muxer: Arc<dyn Muxer>, interval: Duration) -> Self {
        Self {
            state: RecordingState::Idle,
            format: None,
            chunks: Vec::new(),
            result: None,
            muxer,
            interval: interval.max(Duration::from_millis(1)),
            next_sample: None,
            session: 0,
            encoding: false,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn format(&self) -> Option<RecordingFormat> {
        self.format
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result.as_ref().map(ResourceHandle::url)
    }

    pub fn next_sample(&self) -> Option<Instant> {
        self.next_sample
    }

    /// Begin recording. `Ok(false)` when already recording.
    pub fn start(
        &mut self,
        surface: Option<&RgbaImage>,
        now: Instant,
    ) -> Result<bool, FaceLinkError> {
        if self.state == RecordingState::Recording {
            return Ok(false);
        }
        if surface.is_none() {
            return Err(FaceLinkError::capability("no rendered output to record yet"));
        }
        let format = RecordingFormat::select(|f| self.muxer.supports(f))
            .ok_or_else(|| FaceLinkError::capability("no supported recording format"))?;

        self.format = Some(format);
        self.chunks.clear();
        self.session += 1;
        self.encoding = false;
        self.state = RecordingState::Recording;
        self.next_sample = Some(now);
        info!("Recording started ({})", format.mime());
        Ok(true)
    }

    /// Schedule the next sample and snapshot the surface for encoding. `None`
    /// while idle, without a surface, or while the previous chunk is encoding.
    pub fn sample(&mut self, surface: Option<&RgbaImage>, now: Instant) -> Option<ChunkJob> {
        if self.state != RecordingState::Recording {
            return None;
        }
        self.next_sample = Some(now + self.interval);
        if self.encoding {
            debug!("sample skipped: previous chunk still encoding");
            return None;
        }
        let frame = surface?.clone();
        self.encoding = true;
        Some(ChunkJob { session: self.session, muxer: Arc::clone(&self.muxer), frame })
    }

    /// Append a finished chunk. Returns whether it was kept.
    pub fn push_chunk(&mut self, chunk: EncodedChunk) -> bool {
        if chunk.session != self.session || self.state != RecordingState::Recording {
            debug!("late chunk from session {} dropped", chunk.session);
            return false;
        }
        self.encoding = false;
        match chunk.result {
            Ok(data) => {
                self.chunks.push(data);
                true
            }
            Err(e) => {
                warn!("recording chunk dropped: {}", e);
                false
            }
        }
    }

    /// Finalize into a resource named `<label>.<ext>`. The previous result is
    /// revoked first. `Ok(None)` when not recording.
    pub fn stop(
        &mut self,
        store: &mut dyn BlobStore,
        label: &str,
    ) -> Result<Option<&str>, FaceLinkError> {
        if self.state != RecordingState::Recording {
            return Ok(None);
        }
        self.state = RecordingState::Stopped;
        self.next_sample = None;
        self.encoding = false;
        release(store, &mut self.result);

        let format = self.format.unwrap_or(RecordingFormat::Mjpeg);
        let chunks = std::mem::take(&mut self.chunks);
        debug!("finalizing {} chunks", chunks.len());
        let data = self.muxer.finish(format, chunks);
        let name = format!("{}.{}", label, format.extension());
        let handle = store.create(data, format.mime(), &name)?;
        info!("Recording saved: {} ({} bytes)", handle.url(), handle.len());
        self.result = Some(handle);
        Ok(self.result_url())
    }

    /// Drop accumulated chunks and revoke the result.
    pub fn release(&mut self, store: &mut dyn BlobStore) {
        self.chunks.clear();
        self.next_sample = None;
        self.encoding = false;
        if self.state == RecordingState::Recording {
            self.state = RecordingState::Stopped;
        }
        release(store, &mut self.result);
    }
}
