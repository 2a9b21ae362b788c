//! `Engine`: the single task that owns every client component.
//!
//! ```text
//!  EngineHandle ── Command ───►┐
//!  channel events ────────────►│
//!  request completions ───────►│  Engine (one tokio task, no locks)
//!  job timer ticks ───────────►│      │
//!  capture / record deadlines ►┘      └── EngineUpdate ──► UI / CLI
//! ```
//!
//! Network calls never run on the engine task: they are spawned and report
//! back as internal events, so a slow backend cannot stall frame pacing.
//! Each call is bounded by the configured request or upload timeout. Image
//! work (frame grab and encode, reply decode, recording chunks, detection
//! stills) runs on the blocking pool the same way. Every completion is
//! applied on the engine task in arrival order.
//!
//! # Updates
//!
//! [`Engine::spawn`] returns an unbounded [`EngineUpdate`] receiver. The
//! stream ends with [`EngineUpdate::Stopped`] after shutdown, once every timer
//! is cancelled and every resource is revoked.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use facelink_capture::{decode_image, DurationProbe, FrameEncoder, SharedSource, VideoFrame};
use facelink_core::types::OverlayBox;
use facelink_core::{
    BlobStore, ClientConfig, ConnectionState, DetectedFace, FaceLinkError, JobError, RecordingState,
    ReferenceIdentity, TransportError, VideoJob,
};
use facelink_transport::{
    BackendApi, ChannelConnector, ChannelEvent, ChannelPair, Detection, JobStatusReport,
    ReferenceInfo, VideoUpload,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::capture_loop::{CaptureLoop, EncodedFrame, TickOutcome};
use crate::connection::ConnectionManager;
use crate::faces::{capture_still, EncodedStill, FaceWorkflow};
use crate::job::{JobEvent, JobOrchestrator, JobTick};
use crate::recorder::{EncodedChunk, Muxer, Recorder};
use crate::reference::ReferenceTracker;
use crate::render::{RenderOutcome, RenderSink};

// ── Commands & updates ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartCamera,
    StopCamera,
    Connect,
    Disconnect,
    ScanFaces,
    SelectFace(i64),
    UploadReference(PathBuf),
    RefreshReference,
    SubmitVideo { path: PathBuf, proceed_without_target: bool },
    StartRecording,
    StopRecording,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    Connection(ConnectionState),
    Camera { active: bool },
    FrameRendered { width: u32, height: u32, frames: u64 },
    FacesDetected {
        message: String,
        faces: Vec<DetectedFace>,
        overlays: Vec<OverlayBox>,
        preview_url: Option<String>,
    },
    FaceScanFailed(String),
    TargetSelected(i64),
    TargetSelectionFailed(String),
    /// Backend target flag, sent after every successful `/target-info` refresh
    /// and when a selection lands after the scan it was made on was replaced.
    TargetAvailable(bool),
    /// Periodic refresh observed a different identity.
    Reference(ReferenceIdentity),
    ReferenceUploaded(ReferenceIdentity),
    ReferenceFailed(String),
    Job(VideoJob),
    JobDone { job: VideoJob, url: String },
    JobFailed(String),
    /// Submission refused before any network call.
    JobRejected(JobError),
    Recording { state: RecordingState, url: Option<String> },
    Error(String),
    Stopped,
}

/// Capabilities the engine is built from.
pub struct EngineDeps {
    pub source: SharedSource,
    /// Encoder for streamed frames.
    pub capture_encoder: Box<dyn FrameEncoder>,
    /// Encoder for detection stills.
    pub still_encoder: Arc<dyn FrameEncoder>,
    pub backend: Arc<dyn BackendApi>,
    pub connector: Arc<dyn ChannelConnector>,
    pub store: Box<dyn BlobStore>,
    pub probe: Arc<dyn DurationProbe>,
    pub muxer: Arc<dyn Muxer>,
}

/// Cloneable command sender for a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// `false` once the engine has stopped.
    pub fn send(&self, cmd: Command) -> bool {
        self.tx.send(cmd).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

// ── Internal events ───────────────────────────────────────────────────────────

enum Internal {
    Opened { generation: u64, result: Result<ChannelPair, TransportError> },
    FrameEncoded(EncodedFrame),
    Decoded { epoch: u64, result: Result<VideoFrame, FaceLinkError> },
    ChunkEncoded(EncodedChunk),
    StillCaptured(Result<EncodedStill, FaceLinkError>),
    Detected(Result<Detection, FaceLinkError>),
    Selected { scan: u64, index: i64, result: Result<(), FaceLinkError> },
    ReferenceUploaded(Result<ReferenceInfo, FaceLinkError>),
    RefreshDone {
        reference: Result<ReferenceInfo, FaceLinkError>,
        target: Result<bool, FaceLinkError>,
    },
    Submitted { submission: u64, result: Result<String, FaceLinkError>, duration: f64 },
    Status { submission: u64, result: Result<JobStatusReport, FaceLinkError> },
    ResultFetched { submission: u64, result: Result<Bytes, FaceLinkError> },
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct Engine {
    config: ClientConfig,
    source: SharedSource,
    still_encoder: Arc<dyn FrameEncoder>,
    backend: Arc<dyn BackendApi>,
    probe: Arc<dyn DurationProbe>,
    store: Box<dyn BlobStore>,
    conn: ConnectionManager,
    capture: CaptureLoop,
    render: RenderSink,
    faces: FaceWorkflow,
    jobs: JobOrchestrator,
    recorder: Recorder,
    reference: ReferenceTracker,
    channel_rx: Option<mpsc::Receiver<ChannelEvent>>,
    camera_active: bool,
    internal_tx: mpsc::UnboundedSender<Internal>,
    updates: mpsc::UnboundedSender<EngineUpdate>,
}

impl Engine {
    /// Start the engine task.
    pub fn spawn(
        config: ClientConfig,
        deps: EngineDeps,
    ) -> (EngineHandle, mpsc::UnboundedReceiver<EngineUpdate>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        let engine = Engine {
            conn: ConnectionManager::new(deps.connector, config.ws_url.clone()),
            capture: CaptureLoop::new(
                config.capture.target_width,
                deps.capture_encoder,
                config.capture.tick_interval(),
            ),
            render: RenderSink::new(),
            faces: FaceWorkflow::new(),
            jobs: JobOrchestrator::new(
                tick_tx,
                config.poll_interval(),
                config.countdown_interval(),
            ),
            recorder: Recorder::new(deps.muxer, config.recording.frame_interval()),
            reference: ReferenceTracker::new(config.backend_origin.clone()),
            source: deps.source,
            still_encoder: deps.still_encoder,
            backend: deps.backend,
            probe: deps.probe,
            store: deps.store,
            channel_rx: None,
            camera_active: false,
            internal_tx,
            updates: update_tx,
            config,
        };
        tokio::spawn(engine.run(cmd_rx, internal_rx, tick_rx));
        (EngineHandle { tx: cmd_tx }, update_rx)
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        mut tick_rx: mpsc::UnboundedReceiver<JobTick>,
    ) {
        let refresh_period = self.config.reference_refresh().max(Duration::from_millis(1));
        let mut reference_ticker = tokio::time::interval(refresh_period);
        reference_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Engine started (backend {}, channel {})",
            self.config.backend_origin, self.config.ws_url
        );

        loop {
            let capture_due = self.capture.next_tick();
            let record_due = self.recorder.next_sample();

            tokio::select! {
                maybe_cmd = cmd_rx.recv() => {
                    match maybe_cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }

                maybe_event = recv_channel(&mut self.channel_rx) => {
                    self.handle_channel(maybe_event)
                }

                Some(internal) = internal_rx.recv() => self.handle_internal(internal),

                Some(tick) = tick_rx.recv() => {
                    let event = self.jobs.on_tick(tick);
                    self.apply_job_event(event);
                }

                _ = sleep_until_opt(capture_due) => {
                    match self.capture.tick(Instant::now(), &self.source, &self.conn) {
                        TickOutcome::Dispatched(job) => {
                            self.spawn_blocking(move || Internal::FrameEncoded(job.run()));
                        }
                        outcome => debug!("capture tick: {:?}", outcome),
                    }
                }

                _ = sleep_until_opt(record_due) => {
                    if let Some(job) = self.recorder.sample(self.render.surface(), Instant::now()) {
                        self.spawn_blocking(move || Internal::ChunkEncoded(job.run()));
                    }
                }

                _ = reference_ticker.tick() => self.refresh_reference(),
            }
        }

        self.shutdown();
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    fn handle_command(&mut self, cmd: Command) {
        debug!("command: {:?}", cmd);
        match cmd {
            Command::StartCamera => self.start_camera(),
            Command::StopCamera => {
                if self.camera_active {
                    self.source.with(|source| source.stop());
                    self.camera_active = false;
                    info!("Camera stopped");
                    self.emit(EngineUpdate::Camera { active: false });
                    self.sync_capture();
                }
            }
            Command::Connect => {
                if let Some(attempt) = self.conn.begin_connect() {
                    self.emit(EngineUpdate::Connection(ConnectionState::Connecting));
                    let limit = self.config.request_timeout();
                    let generation = attempt.generation();
                    self.spawn_request(async move {
                        let result = match tokio::time::timeout(limit, attempt.run()).await {
                            Ok((_, result)) => result,
                            Err(_) => {
                                warn!("channel open timed out after {:?}", limit);
                                Err(timeout_error(limit))
                            }
                        };
                        Internal::Opened { generation, result }
                    });
                }
            }
            Command::Disconnect => {
                let before = self.conn.state();
                self.conn.disconnect();
                if self.conn.state() != before {
                    self.emit(EngineUpdate::Connection(self.conn.state()));
                    self.sync_capture();
                }
            }
            Command::ScanFaces => self.scan_faces(),
            Command::SelectFace(index) => self.select_face(index),
            Command::UploadReference(path) => {
                let backend = Arc::clone(&self.backend);
                let limit = self.config.upload_timeout();
                self.spawn_request(async move {
                    let result = match tokio::fs::read(&path).await {
                        Ok(data) => {
                            let name = file_name(&path);
                            let upload = backend.upload_reference(&name, Bytes::from(data));
                            bounded(limit, "reference upload", upload).await
                        }
                        Err(e) => Err(e.into()),
                    };
                    Internal::ReferenceUploaded(result)
                });
            }
            Command::RefreshReference => self.refresh_reference(),
            Command::SubmitVideo { path, proceed_without_target } => {
                self.submit_video(path, proceed_without_target)
            }
            Command::StartRecording => {
                match self.recorder.start(self.render.surface(), Instant::now()) {
                    Ok(true) => self.emit(EngineUpdate::Recording {
                        state: RecordingState::Recording,
                        url: None,
                    }),
                    Ok(false) => debug!("already recording"),
                    Err(e) => self.emit(EngineUpdate::Error(e.user_message())),
                }
            }
            Command::StopRecording => {
                let label = format!("facelink_{}", ts_ms());
                let stopped = self
                    .recorder
                    .stop(self.store.as_mut(), &label)
                    .map(|url| url.map(str::to_owned));
                match stopped {
                    Ok(Some(url)) => {
                        self.emit(EngineUpdate::Recording {
                            state: RecordingState::Stopped,
                            url: Some(url),
                        });
                    }
                    Ok(None) => debug!("not recording"),
                    Err(e) => self.emit(EngineUpdate::Error(e.user_message())),
                }
            }
            Command::Shutdown => {}
        }
    }

    fn start_camera(&mut self) {
        if self.camera_active {
            return;
        }
        match self.source.with(|source| source.start()) {
            Ok(()) => {
                self.camera_active = true;
                info!("Camera started");
                self.emit(EngineUpdate::Camera { active: true });
                self.sync_capture();
            }
            Err(e) => {
                warn!("Camera start failed: {}", e);
                self.emit(EngineUpdate::Error(e.user_message()));
            }
        }
    }

    fn scan_faces(&mut self) {
        if let Err(e) = self.faces.begin_scan() {
            self.emit(EngineUpdate::FaceScanFailed(e.to_string()));
            return;
        }
        let source = self.source.clone();
        let encoder = Arc::clone(&self.still_encoder);
        self.spawn_blocking(move || {
            Internal::StillCaptured(capture_still(&source, encoder.as_ref()))
        });
    }

    fn detect_faces(&mut self, still: Bytes) {
        let backend = Arc::clone(&self.backend);
        let limit = self.config.request_timeout();
        self.spawn_request(async move {
            Internal::Detected(bounded(limit, "face detection", backend.detect_faces(still)).await)
        });
    }

    fn select_face(&mut self, index: i64) {
        match self.faces.begin_select(index) {
            Ok(pending) => {
                let backend = Arc::clone(&self.backend);
                let limit = self.config.request_timeout();
                self.spawn_request(async move {
                    let select = backend.select_target(pending.still, pending.index);
                    let result = bounded(limit, "face selection", select).await;
                    Internal::Selected { scan: pending.scan, index: pending.index, result }
                });
            }
            Err(e) => self.emit(EngineUpdate::TargetSelectionFailed(e.to_string())),
        }
    }

    fn submit_video(&mut self, path: PathBuf, proceed_without_target: bool) {
        let has_target = self.faces.has_target();
        let store = self.store.as_mut();
        let submission = match self.jobs.begin_submit(has_target, proceed_without_target, store) {
            Ok(submission) => submission,
            Err(e) => {
                warn!("Submission refused: {}", e);
                self.emit(EngineUpdate::JobRejected(e));
                return;
            }
        };
        let backend = Arc::clone(&self.backend);
        let probe = Arc::clone(&self.probe);
        let limit = self.config.upload_timeout();
        self.spawn_request(async move {
            let upload = bounded(limit, "video upload", upload_video(backend.as_ref(), &path));
            let (duration, result) = tokio::join!(probe.probe(&path), upload);
            Internal::Submitted { submission, result, duration }
        });
    }

    fn refresh_reference(&mut self) {
        if !self.reference.begin_refresh() {
            debug!("reference refresh already outstanding");
            return;
        }
        let backend = Arc::clone(&self.backend);
        let limit = self.config.request_timeout();
        self.spawn_request(async move {
            let (reference, target) = tokio::join!(
                bounded(limit, "reference info", backend.reference_info()),
                bounded(limit, "target info", backend.target_info()),
            );
            Internal::RefreshDone { reference, target }
        });
    }

    // ── Channel ───────────────────────────────────────────────────────────────

    fn handle_channel(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Frame(payload)) => {
                let epoch = self.capture.epoch();
                self.spawn_blocking(move || Internal::Decoded {
                    epoch,
                    result: decode_image(&payload),
                });
            }
            Some(ChannelEvent::Error(reason)) => self.connection_lost(Some(&reason)),
            Some(ChannelEvent::Closed) | None => self.connection_lost(None),
        }
    }

    /// Close or error: collapse to `Disconnected` and halt the loop in the same turn.
    fn connection_lost(&mut self, reason: Option<&str>) {
        self.conn.on_lost(reason);
        self.channel_rx = None;
        self.capture.cancel();
        self.emit(EngineUpdate::Connection(ConnectionState::Disconnected));
    }

    /// Run the capture loop exactly while the camera is on and the channel is up.
    fn sync_capture(&mut self) {
        if self.camera_active && self.conn.state().is_connected() {
            self.capture.start(Instant::now());
        } else {
            self.capture.cancel();
        }
    }

    // ── Completions ───────────────────────────────────────────────────────────

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Opened { generation, result } => {
                match self.conn.on_opened(generation, result) {
                    Ok(Some(events)) => {
                        self.channel_rx = Some(events);
                        self.emit(EngineUpdate::Connection(ConnectionState::Connected));
                        self.sync_capture();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.emit(EngineUpdate::Connection(ConnectionState::Disconnected));
                        self.emit(EngineUpdate::Error(format!("Connect failed: {}", e)));
                    }
                }
            }
            Internal::FrameEncoded(done) => {
                let outcome = self.capture.on_encoded(done, &mut self.conn);
                debug!("capture send: {:?}", outcome);
            }
            Internal::Decoded { epoch, result } => {
                if let RenderOutcome::Painted { width, height, .. } = self.render.paint(result) {
                    let frames = self.render.frames_painted();
                    self.emit(EngineUpdate::FrameRendered { width, height, frames });
                }
                self.capture.on_reply(epoch);
            }
            Internal::ChunkEncoded(chunk) => {
                self.recorder.push_chunk(chunk);
            }
            Internal::StillCaptured(result) => {
                match self.faces.on_still(result, self.store.as_mut()) {
                    Ok(still) => self.detect_faces(still),
                    Err(e) => self.emit(EngineUpdate::FaceScanFailed(e.user_message())),
                }
            }
            Internal::Detected(result) => {
                let preview_url = self.faces.still().map(|s| s.preview.url().to_owned());
                match self.faces.complete_scan(result) {
                    Ok(_) => self.emit(EngineUpdate::FacesDetected {
                        message: self.faces.message().unwrap_or_default().to_owned(),
                        faces: self.faces.faces().to_vec(),
                        overlays: self.faces.overlays(),
                        preview_url,
                    }),
                    Err(e) => self.emit(EngineUpdate::FaceScanFailed(e.user_message())),
                }
            }
            Internal::Selected { scan, index, result } => {
                match self.faces.complete_select(scan, index, result) {
                    Ok(Some(index)) => self.emit(EngineUpdate::TargetSelected(index)),
                    Ok(None) => self.emit(EngineUpdate::TargetAvailable(true)),
                    Err(e) => self.emit(EngineUpdate::TargetSelectionFailed(e.user_message())),
                }
            }
            Internal::ReferenceUploaded(result) => match result {
                Ok(info) => {
                    let identity = self.reference.apply(info, ts_ms()).clone();
                    self.emit(EngineUpdate::ReferenceUploaded(identity));
                }
                Err(e) => self.emit(EngineUpdate::ReferenceFailed(e.user_message())),
            },
            Internal::RefreshDone { reference, target } => {
                if self.reference.on_refresh(reference, ts_ms()) {
                    self.emit(EngineUpdate::Reference(self.reference.identity().clone()));
                }
                match target {
                    Ok(has_target) => {
                        self.faces.set_has_target(has_target);
                        self.emit(EngineUpdate::TargetAvailable(has_target));
                    }
                    Err(e) => debug!("target-info refresh failed: {}", e),
                }
            }
            Internal::Submitted { submission, result, duration } => {
                let now = Instant::now().into_std();
                let event = self.jobs.on_submitted(submission, result, duration, now);
                self.apply_job_event(event);
            }
            Internal::Status { submission, result } => {
                let event = self.jobs.on_status(submission, result, Instant::now().into_std());
                self.apply_job_event(event);
            }
            Internal::ResultFetched { submission, result } => {
                let event = self.jobs.on_result(submission, result, self.store.as_mut());
                self.apply_job_event(event);
            }
        }
    }

    fn apply_job_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::Ignored => {}
            JobEvent::Started(job) | JobEvent::Updated(job) => self.emit(EngineUpdate::Job(job)),
            JobEvent::PollDue(job_id) => {
                let submission = self.jobs.submission();
                let backend = Arc::clone(&self.backend);
                let limit = self.config.request_timeout();
                self.spawn_request(async move {
                    let result = bounded(limit, "job status", backend.job_status(&job_id)).await;
                    Internal::Status { submission, result }
                });
            }
            JobEvent::FetchResult(job_id) => {
                let submission = self.jobs.submission();
                let backend = Arc::clone(&self.backend);
                let limit = self.config.upload_timeout();
                self.spawn_request(async move {
                    let result = bounded(limit, "job result", backend.job_result(&job_id)).await;
                    Internal::ResultFetched { submission, result }
                });
            }
            JobEvent::Completed { job, url } => self.emit(EngineUpdate::JobDone { job, url }),
            JobEvent::Failed(message) => self.emit(EngineUpdate::JobFailed(message)),
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = Internal> + Send + 'static,
    {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(request.await);
        });
    }

    fn spawn_blocking<F>(&self, work: F)
    where
        F: FnOnce() -> Internal + Send + 'static,
    {
        let tx = self.internal_tx.clone();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(work());
        });
    }

    fn emit(&self, update: EngineUpdate) {
        let _ = self.updates.send(update);
    }

    /// Close the channel, cancel every timer, revoke every resource.
    fn shutdown(&mut self) {
        info!("Engine shutting down");
        self.conn.disconnect();
        self.channel_rx = None;
        self.capture.cancel();
        if self.camera_active {
            self.source.with(|source| source.stop());
            self.camera_active = false;
        }
        self.jobs.shutdown(self.store.as_mut());
        self.faces.release(self.store.as_mut());
        self.recorder.release(self.store.as_mut());
        self.emit(EngineUpdate::Stopped);
    }
}

async fn recv_channel(rx: &mut Option<mpsc::Receiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Await `request`, failing with [`TransportError::Timeout`] after `limit`.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    request: impl Future<Output = Result<T, FaceLinkError>>,
) -> Result<T, FaceLinkError> {
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} timed out after {:?}", what, limit);
            Err(timeout_error(limit).into())
        }
    }
}

fn timeout_error(limit: Duration) -> TransportError {
    TransportError::Timeout { ms: limit.as_millis() as u64 }
}

async fn upload_video(backend: &dyn BackendApi, path: &Path) -> Result<String, FaceLinkError> {
    let data = tokio::fs::read(path).await?;
    let video = VideoUpload {
        file_name: file_name(path),
        mime: video_mime(path).to_owned(),
        data: Bytes::from(data),
    };
    backend.process_video(video).await
}

fn ts_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_owned())
}

/// MIME type for an uploaded video, from its extension.
pub fn video_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
