//! FaceLink client core.
//!
//! ```text
//! MediaSource ─► CaptureLoop ─► ConnectionManager ══ ws ══► backend
//!                    ▲                                         │
//!                    └──── in-flight cleared ◄── RenderSink ◄──┘
//!
//! FaceWorkflow    ── detect / select  ──► backend (HTTP)
//! JobOrchestrator ── submit / poll    ──► backend (HTTP)
//! Recorder        ◄── render surface
//! ```
//!
//! Every component is a plain state machine; [`engine::Engine`] owns them all
//! on one task and turns commands, timer ticks, network completions and
//! blocking image work results into calls on them.

pub mod capture_loop;
pub mod connection;
pub mod engine;
pub mod faces;
pub mod job;
pub mod recorder;
pub mod reference;
pub mod render;
pub mod timer;

pub use capture_loop::{CaptureLoop, EncodedFrame, FrameJob, SendOutcome, SkipReason, TickOutcome};
pub use connection::{ConnectAttempt, ConnectionManager};
pub use engine::{Command, Engine, EngineDeps, EngineHandle, EngineUpdate};
pub use faces::{capture_still, EncodedStill, FaceWorkflow, PendingSelection, ScanState};
pub use job::{JobEvent, JobOrchestrator, JobPhase, JobTick, JobTickKind};
pub use recorder::{ChunkJob, EncodedChunk, MjpegMuxer, Muxer, Recorder, RecordingFormat};
pub use reference::ReferenceTracker;
pub use render::{RenderOutcome, RenderSink};
pub use timer::RepeatingTask;
