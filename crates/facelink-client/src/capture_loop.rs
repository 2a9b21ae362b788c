//! Capture → encode → send, paced by replies.
//!
//! A tick re-arms itself before doing anything else, then dispatches a
//! [`FrameJob`] only when the channel is open and no earlier frame is still
//! awaiting its reply. The job grabs, draws and encodes off the owner's task;
//! [`CaptureLoop::on_encoded`] sends the result. Failures forfeit the frame;
//! nothing is queued or retried.
//!
//! The in-flight flag is raised at dispatch, so encode time counts against
//! the one-frame budget. [`CaptureLoop::cancel`] bumps the epoch; completions
//! and replies from an older epoch are discarded.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use facelink_capture::{CaptureCanvas, FrameEncoder, SharedSource};
use facelink_core::{FaceError, FaceLinkError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;

/// Why a tick or an encoded frame sent nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ChannelNotOpen,
    InFlight,
    /// The worker is still busy with a frame from a cancelled run.
    Encoding,
    NoFrame,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// The loop is not running.
    Idle,
    Skipped(SkipReason),
    /// Run the job off the owner's task and hand the result to `on_encoded`.
    Dispatched(FrameJob),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { bytes: usize, width: u32, height: u32 },
    Skipped(SkipReason),
    /// Encode or send failed; the frame is dropped.
    Failed(String),
    /// The loop was cancelled while the frame was encoding.
    Stale,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub sent: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Canvas and encoder, lent to one [`FrameJob`] at a time.
struct FrameWorker {
    canvas: CaptureCanvas,
    encoder: Box<dyn FrameEncoder>,
}

/// One frame to grab, draw and encode. Blocking.
pub struct FrameJob {
    epoch: u64,
    worker: FrameWorker,
    source: SharedSource,
}

impl fmt::Debug for FrameJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameJob")
            .field("epoch", &self.epoch)
            .field("target_width", &self.worker.canvas.target_width())
            .finish()
    }
}

impl FrameJob {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn run(mut self) -> EncodedFrame {
        let result = encode_current(&mut self.worker, &self.source);
        EncodedFrame { epoch: self.epoch, worker: self.worker, result }
    }
}

fn encode_current(
    worker: &mut FrameWorker,
    source: &SharedSource,
) -> Result<(Bytes, u32, u32), FaceLinkError> {
    let frame = source.current_frame().ok_or(FaceError::NoFrameAvailable)?;
    let drawn = worker.canvas.draw(&frame);
    let (width, height) = drawn.dimensions();
    let bytes = worker.encoder.encode(drawn)?;
    Ok((bytes, width, height))
}

/// A finished [`FrameJob`]; returns the worker to the loop.
pub struct EncodedFrame {
    epoch: u64,
    worker: FrameWorker,
    result: Result<(Bytes, u32, u32), FaceLinkError>,
}

impl fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedFrame")
            .field("epoch", &self.epoch)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

pub struct CaptureLoop {
    worker: Option<FrameWorker>,
    in_flight: bool,
    epoch: u64,
    next_tick: Option<Instant>,
    interval: Duration,
    stats: CaptureStats,
}

impl CaptureLoop {
    pub fn new(target_width: u32, encoder: Box<dyn FrameEncoder>, interval: Duration) -> Self {
        Self {
            worker: Some(FrameWorker { canvas: CaptureCanvas::new(target_width), encoder }),
            in_flight: false,
            epoch: 0,
            next_tick: None,
            interval,
            stats: CaptureStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Deadline of the scheduled tick, if the loop is running.
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Current run; replies must be tagged with it when they arrive.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Schedule the first tick at `now`. No-op if already running.
    pub fn start(&mut self, now: Instant) {
        if self.next_tick.is_none() {
            debug!("capture loop started ({:?} period)", self.interval);
            self.next_tick = Some(now);
        }
    }

    /// Cancel the scheduled tick and forget any outstanding frame.
    pub fn cancel(&mut self) {
        if self.next_tick.take().is_some() {
            debug!("capture loop cancelled");
        }
        self.epoch += 1;
        self.in_flight = false;
    }

    /// A reply arrived for a frame sent during `epoch`.
    pub fn on_reply(&mut self, epoch: u64) {
        if epoch == self.epoch {
            self.in_flight = false;
        } else {
            debug!("reply from cancelled run {} ignored", epoch);
        }
    }

    pub fn tick(
        &mut self,
        now: Instant,
        source: &SharedSource,
        conn: &ConnectionManager,
    ) -> TickOutcome {
        if self.next_tick.is_none() {
            return TickOutcome::Idle;
        }
        self.next_tick = Some(now + self.interval);

        if !conn.is_open() {
            return TickOutcome::Skipped(self.skip(SkipReason::ChannelNotOpen));
        }
        if self.in_flight {
            return TickOutcome::Skipped(self.skip(SkipReason::InFlight));
        }
        let Some(worker) = self.worker.take() else {
            return TickOutcome::Skipped(self.skip(SkipReason::Encoding));
        };
        self.in_flight = true;
        TickOutcome::Dispatched(FrameJob { epoch: self.epoch, worker, source: source.clone() })
    }

    /// Send a finished frame, unless the run it belongs to was cancelled.
    pub fn on_encoded(&mut self, done: EncodedFrame, conn: &mut ConnectionManager) -> SendOutcome {
        let EncodedFrame { epoch, worker, result } = done;
        self.worker = Some(worker);
        if epoch != self.epoch {
            debug!("frame from cancelled run {} dropped", epoch);
            return SendOutcome::Stale;
        }

        let (encoded, width, height) = match result {
            Ok(frame) => frame,
            Err(FaceLinkError::Face(FaceError::NoFrameAvailable)) => {
                self.in_flight = false;
                return SendOutcome::Skipped(self.skip(SkipReason::NoFrame));
            }
            Err(e) => return self.fail(e.to_string()),
        };
        let bytes = encoded.len();
        if let Err(e) = conn.send(encoded) {
            return self.fail(e.to_string());
        }
        self.stats.sent += 1;
        debug!("frame sent: {}x{} ({} bytes)", width, height, bytes);
        SendOutcome::Sent { bytes, width, height }
    }

    fn skip(&mut self, reason: SkipReason) -> SkipReason {
        self.stats.skipped += 1;
        reason
    }

    fn fail(&mut self, reason: String) -> SendOutcome {
        warn!("frame dropped: {}", reason);
        self.in_flight = false;
        self.stats.failed += 1;
        SendOutcome::Failed(reason)
    }
}
