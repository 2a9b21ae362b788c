use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::resource::ResourceHandle;

// MARK: - ConnectionState

/// State of the persistent frame channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

// MARK: - Faces

/// Face bounding box in pixel coordinates of the still it was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Fractional overlay position relative to a `still_width × still_height` frame.
    pub fn to_overlay(&self, still_width: u32, still_height: u32) -> OverlayBox {
        let w = still_width.max(1) as f64;
        let h = still_height.max(1) as f64;
        OverlayBox {
            left: self.x1 / w,
            top: self.y1 / h,
            width: self.width() / w,
            height: self.height() / h,
        }
    }
}

/// Overlay rectangle as fractions (0..1) of the displayed still.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One face reported by the detection endpoint.
///
/// `index` is server-assigned and only meaningful for the still that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(rename = "idx")]
    pub index: i64,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub score: f64,
}

/// A single still captured for face detection.
#[derive(Debug)]
pub struct CapturedStillFrame {
    pub encoded: Bytes,
    pub width: u32,
    pub height: u32,
    pub preview: ResourceHandle,
}

// MARK: - Video jobs

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Submitted,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// The single live video-processing job.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoJob {
    pub job_id: String,
    pub status: JobStatus,
    /// Always within `[0, 100]`.
    pub progress_percent: f64,
    pub status_message: String,
    pub eta_seconds: Option<f64>,
    pub started_at: Instant,
}

impl VideoJob {
    pub fn new(job_id: impl Into<String>, started_at: Instant, eta_seconds: f64) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Submitted,
            progress_percent: 0.0,
            status_message: "Uploaded, waiting for processing".to_owned(),
            eta_seconds: Some(eta_seconds),
            started_at,
        }
    }

    pub fn elapsed_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started_at).as_secs_f64()
    }
}

// MARK: - Reference identity

/// Cached mirror of the backend's reference face.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceIdentity {
    pub id: Option<String>,
    pub thumbnail_url: Option<String>,
}

// MARK: - Recording

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Stopped,
}
