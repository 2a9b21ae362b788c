//! Face detection and target selection on a captured still.
//!
//! ```text
//! Idle ──begin_scan──► Capturing ──on_still(Ok)──► Detecting ──complete_scan──► Idle
//!                          └───────on_still(Err)──────────────────────────────► Idle
//! ```
//!
//! Face indices are only meaningful for the still that produced them; a new
//! scan discards the previous list and selection. Every still gets a new scan
//! number, and a selection that completes after a rescan only updates the
//! backend target flag.

use bytes::Bytes;
use facelink_capture::{FrameEncoder, SharedSource};
use facelink_core::resource::release;
use facelink_core::types::OverlayBox;
use facelink_core::{BlobStore, CapturedStillFrame, DetectedFace, FaceError, FaceLinkError};
use facelink_transport::Detection;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    Idle,
    Capturing,
    Detecting,
}

/// A still grabbed and encoded at native resolution.
#[derive(Debug, Clone)]
pub struct EncodedStill {
    pub encoded: Bytes,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Grab and encode the current frame. Blocking.
pub fn capture_still(
    source: &SharedSource,
    encoder: &dyn FrameEncoder,
) -> Result<EncodedStill, FaceLinkError> {
    let frame = source.current_frame().ok_or(FaceError::NoFrameAvailable)?;
    let encoded = encoder.encode(&frame.image)?;
    Ok(EncodedStill { encoded, mime: encoder.mime(), width: frame.width(), height: frame.height() })
}

/// A selection request bound to the scan it was made against.
#[derive(Debug, Clone)]
pub struct PendingSelection {
    pub scan: u64,
    pub index: i64,
    pub still: Bytes,
}

#[derive(Default)]
pub struct FaceWorkflow {
    state: ScanState,
    scan: u64,
    still: Option<CapturedStillFrame>,
    faces: Vec<DetectedFace>,
    message: Option<String>,
    error: Option<String>,
    selected: Option<i64>,
    has_target: bool,
}

impl FaceWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Number of the current still.
    pub fn scan(&self) -> u64 {
        self.scan
    }

    pub fn faces(&self) -> &[DetectedFace] {
        &self.faces
    }

    pub fn still(&self) -> Option<&CapturedStillFrame> {
        self.still.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn has_target(&self) -> bool {
        self.has_target
    }

    /// Mirror the backend's target flag (from `/target-info` or a selection).
    pub fn set_has_target(&mut self, has_target: bool) {
        self.has_target = has_target;
    }

    /// Claim the workflow for a new scan; the still is captured by the caller.
    pub fn begin_scan(&mut self) -> Result<(), FaceError> {
        if self.state != ScanState::Idle {
            return Err(FaceError::ScanInProgress);
        }
        self.state = ScanState::Capturing;
        Ok(())
    }

    /// Adopt a captured still and return its encoding for the detection call.
    /// The previous preview is revoked before the new one is made. A failed
    /// capture keeps the previous still and faces.
    pub fn on_still(
        &mut self,
        result: Result<EncodedStill, FaceLinkError>,
        store: &mut dyn BlobStore,
    ) -> Result<Bytes, FaceLinkError> {
        let adopted = result.and_then(|still| self.adopt(still, store));
        if let Err(e) = &adopted {
            warn!("Still capture failed: {}", e);
            self.state = ScanState::Idle;
        }
        adopted
    }

    fn adopt(
        &mut self,
        still: EncodedStill,
        store: &mut dyn BlobStore,
    ) -> Result<Bytes, FaceLinkError> {
        if let Some(old) = self.still.take() {
            store.revoke(old.preview);
        }
        let preview = store.create(still.encoded.clone(), still.mime, "still.jpg")?;
        self.still = Some(CapturedStillFrame {
            encoded: still.encoded.clone(),
            width: still.width,
            height: still.height,
            preview,
        });
        self.scan += 1;
        self.faces.clear();
        self.selected = None;
        self.message = None;
        self.error = None;
        self.state = ScanState::Detecting;
        info!("Still captured ({}x{}), detecting faces", still.width, still.height);
        Ok(still.encoded)
    }

    /// Store the detection outcome; returns the reported face count.
    pub fn complete_scan(
        &mut self,
        result: Result<Detection, FaceLinkError>,
    ) -> Result<usize, FaceLinkError> {
        self.state = ScanState::Idle;
        match result {
            Ok(detection) => {
                self.message = Some(format!("Faces found: {}", detection.count));
                info!("Faces found: {}", detection.count);
                self.faces = detection.faces;
                Ok(detection.count)
            }
            Err(e) => {
                warn!("Face detection failed: {}", e);
                self.faces.clear();
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Overlay boxes for the current faces, as fractions of the still.
    pub fn overlays(&self) -> Vec<OverlayBox> {
        let Some(still) = self.still.as_ref() else {
            return Vec::new();
        };
        self.faces
            .iter()
            .map(|f| f.bbox.to_overlay(still.width, still.height))
            .collect()
    }

    /// Validate a selection and return the still to resubmit with it.
    pub fn begin_select(&self, index: i64) -> Result<PendingSelection, FaceError> {
        let still = self.still.as_ref().ok_or(FaceError::MustScanFirst)?;
        if self.state != ScanState::Idle {
            return Err(FaceError::ScanInProgress);
        }
        if !self.faces.iter().any(|f| f.index == index) {
            return Err(FaceError::UnknownFaceIndex { index });
        }
        Ok(PendingSelection { scan: self.scan, index, still: still.encoded.clone() })
    }

    /// Record the outcome. Returns the selected index, or `None` when the
    /// backend accepted a face from a superseded scan. Selection state is
    /// untouched on failure.
    pub fn complete_select(
        &mut self,
        scan: u64,
        index: i64,
        result: Result<(), FaceLinkError>,
    ) -> Result<Option<i64>, FaceLinkError> {
        if let Err(e) = result {
            warn!("Face selection failed: {}", e);
            return Err(e);
        }
        self.has_target = true;
        if scan != self.scan || !self.faces.iter().any(|f| f.index == index) {
            debug!(
                "selection of face {} from scan {} is stale (now scan {})",
                index, scan, self.scan
            );
            return Ok(None);
        }
        info!("Target face {} selected", index);
        self.selected = Some(index);
        Ok(Some(index))
    }

    /// Revoke the preview of the current still.
    pub fn release(&mut self, store: &mut dyn BlobStore) {
        let mut preview = self.still.take().map(|s| s.preview);
        release(store, &mut preview);
        self.faces.clear();
        self.state = ScanState::Idle;
    }
}
