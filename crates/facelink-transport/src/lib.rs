//! facelink-transport: client-side transport for FaceLink.
//!
//! # Architecture
//!
//! ```text
//! FaceLink client                          Inference backend
//! ───────────────────────────────          ─────────────────────────────
//! FrameSink ──── ws:// binary JPEG ──────► /ws  (one frame in, one out)
//! ChannelEvent ◄──── processed JPEG ─────┘
//! HttpBackend ── HTTP request/response ──► /detect-faces, /process-video, …
//! ```
//!
//! Both halves sit behind traits ([`ChannelConnector`], [`BackendApi`]) so
//! the client engine can be driven by in-process fakes.

pub mod api;
pub mod channel;

pub use api::{
    BackendApi, Detection, HttpBackend, JobStatusReport, ReferenceInfo, RemoteJobStatus,
    VideoUpload,
};
pub use channel::{ChannelConnector, ChannelEvent, ChannelPair, FrameSink, WsConnector};
