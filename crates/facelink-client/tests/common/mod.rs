//! Shared fakes for engine scenario tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use facelink_capture::{FixedDuration, FrameEncoder, JpegEncoder, SharedSource, SyntheticSource};
use facelink_client::{Engine, EngineDeps, EngineHandle, EngineUpdate, MjpegMuxer};
use facelink_core::{
    ClientConfig, ConnectionState, DetectedFace, FaceLinkError, MemoryBlobStore, TransportError,
};
use facelink_transport::{
    BackendApi, ChannelConnector, ChannelEvent, ChannelPair, Detection, FrameSink, JobStatusReport,
    ReferenceInfo, RemoteJobStatus, VideoUpload,
};
use image::{Rgba, RgbaImage};
use tokio::sync::mpsc;

pub const PATIENCE: Duration = Duration::from_secs(120);

// ── Backend ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Calls {
    pub detect: AtomicUsize,
    pub select: AtomicUsize,
    pub process_video: AtomicUsize,
    pub job_status: AtomicUsize,
    pub job_result: AtomicUsize,
    pub target_info: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted backend. Status reports are served in order; once the script
/// runs out every poll reports "processing" without progress.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Calls,
    pub has_target: AtomicBool,
    pub statuses: Mutex<VecDeque<Result<JobStatusReport, FaceLinkError>>>,
    pub faces: Mutex<Vec<DetectedFace>>,
    pub result: Bytes,
    /// While set, status requests never answer.
    pub stall_status: AtomicBool,
    pub select_delay: Mutex<Duration>,
}

impl FakeBackend {
    pub fn with_statuses(statuses: Vec<Result<JobStatusReport, FaceLinkError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            result: Bytes::from_static(b"\x00\x00\x00\x18ftypmp42"),
            ..Self::default()
        }
    }

    pub fn with_faces(faces: Vec<DetectedFace>) -> Self {
        Self { faces: Mutex::new(faces), ..Self::default() }
    }

    pub fn set_faces(&self, faces: Vec<DetectedFace>) {
        *self.faces.lock().unwrap() = faces;
    }

    pub fn push_statuses(&self, statuses: Vec<Result<JobStatusReport, FaceLinkError>>) {
        self.statuses.lock().unwrap().extend(statuses);
    }
}

pub fn processing(progress: f64) -> Result<JobStatusReport, FaceLinkError> {
    Ok(JobStatusReport {
        ok: true,
        status: RemoteJobStatus::Processing,
        progress: Some(progress),
        msg: None,
    })
}

pub fn done() -> Result<JobStatusReport, FaceLinkError> {
    Ok(JobStatusReport {
        ok: true,
        status: RemoteJobStatus::Done,
        progress: Some(100.0),
        msg: None,
    })
}

pub fn errored(msg: &str) -> Result<JobStatusReport, FaceLinkError> {
    Ok(JobStatusReport {
        ok: true,
        status: RemoteJobStatus::Error,
        progress: None,
        msg: Some(msg.to_owned()),
    })
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn upload_reference(
        &self,
        _file_name: &str,
        _image: Bytes,
    ) -> Result<ReferenceInfo, FaceLinkError> {
        Ok(ReferenceInfo {
            id: Some("ref-1".into()),
            thumb: Some("/reference-thumb".into()),
            has_face: true,
        })
    }

    async fn reference_info(&self) -> Result<ReferenceInfo, FaceLinkError> {
        Ok(ReferenceInfo::default())
    }

    async fn target_info(&self) -> Result<bool, FaceLinkError> {
        self.calls.target_info.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_target.load(Ordering::SeqCst))
    }

    async fn detect_faces(&self, _image: Bytes) -> Result<Detection, FaceLinkError> {
        self.calls.detect.fetch_add(1, Ordering::SeqCst);
        let faces = self.faces.lock().unwrap().clone();
        Ok(Detection { count: faces.len(), faces })
    }

    async fn select_target(&self, _image: Bytes, _index: i64) -> Result<(), FaceLinkError> {
        self.calls.select.fetch_add(1, Ordering::SeqCst);
        let delay = *self.select_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.has_target.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn process_video(&self, _video: VideoUpload) -> Result<String, FaceLinkError> {
        self.calls.process_video.fetch_add(1, Ordering::SeqCst);
        Ok("job-1".to_owned())
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatusReport, FaceLinkError> {
        self.calls.job_status.fetch_add(1, Ordering::SeqCst);
        if self.stall_status.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.statuses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(JobStatusReport {
                ok: true,
                status: RemoteJobStatus::Processing,
                progress: None,
                msg: None,
            })
        })
    }

    async fn job_result(&self, _job_id: &str) -> Result<Bytes, FaceLinkError> {
        self.calls.job_result.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

// ── Channel ───────────────────────────────────────────────────────────────────

/// Connector whose "server" side is driven by the test.
#[derive(Default)]
pub struct LoopbackConnector {
    pub sent: Arc<Mutex<Vec<Bytes>>>,
    pub server: Arc<Mutex<Option<mpsc::Sender<ChannelEvent>>>>,
    pub opens: AtomicUsize,
}

impl LoopbackConnector {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Push an event to the client as if the server sent it.
    pub async fn push(&self, event: ChannelEvent) {
        let server = self.server.lock().unwrap().clone();
        server.expect("channel not open").send(event).await.unwrap();
    }
}

struct LoopbackSink {
    sent: Arc<Mutex<Vec<Bytes>>>,
    events: Option<mpsc::Sender<ChannelEvent>>,
}

impl FrameSink for LoopbackSink {
    fn try_send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        if self.events.is_none() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(events) = self.events.take() {
            let _ = events.try_send(ChannelEvent::Closed);
        }
    }

    fn is_open(&self) -> bool {
        self.events.is_some()
    }
}

#[async_trait]
impl ChannelConnector for LoopbackConnector {
    async fn open(&self, _url: &str) -> Result<ChannelPair, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        *self.server.lock().unwrap() = Some(tx.clone());
        let sink = LoopbackSink { sent: Arc::clone(&self.sent), events: Some(tx) };
        Ok(ChannelPair { sink: Box::new(sink), events: rx })
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub engine: EngineHandle,
    pub updates: mpsc::UnboundedReceiver<EngineUpdate>,
    pub backend: Arc<FakeBackend>,
    pub channel: Arc<LoopbackConnector>,
    pub store: MemoryBlobStore,
}

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.backend_origin = "http://backend.test".to_owned();
    config.ws_url = "ws://backend.test/ws".to_owned();
    config.capture.target_width = 64;
    config.reference_refresh_secs = 3600;
    config
}

impl Harness {
    pub fn start(backend: FakeBackend) -> Self {
        let backend = Arc::new(backend);
        let channel = Arc::new(LoopbackConnector::default());
        let store = MemoryBlobStore::new();
        let deps = EngineDeps {
            source: SharedSource::new(Box::new(SyntheticSource::new(64, 36))),
            capture_encoder: Box::new(JpegEncoder::default()),
            still_encoder: Arc::new(JpegEncoder::new(0.9)),
            backend: backend.clone(),
            connector: channel.clone(),
            store: Box::new(store.clone()),
            probe: Arc::new(FixedDuration(30.0)),
            muxer: Arc::new(MjpegMuxer::default()),
        };
        let (engine, updates) = Engine::spawn(test_config(), deps);
        Self { engine, updates, backend, channel, store }
    }

    /// Wait for the first update `pick` accepts, skipping the rest.
    pub async fn expect<T>(
        &mut self,
        what: &str,
        mut pick: impl FnMut(&EngineUpdate) -> Option<T>,
    ) -> T {
        let found = tokio::time::timeout(PATIENCE, async {
            while let Some(update) = self.updates.recv().await {
                if let Some(value) = pick(&update) {
                    return Some(value);
                }
            }
            None
        })
        .await;
        match found {
            Ok(Some(value)) => value,
            Ok(None) => panic!("engine stopped while waiting for {}", what),
            Err(_) => panic!("timed out waiting for {}", what),
        }
    }

    pub async fn connect(&mut self) {
        self.engine.send(facelink_client::Command::Connect);
        let connected = EngineUpdate::Connection(ConnectionState::Connected);
        self.expect("connected", |u| (u == &connected).then_some(())).await;
    }

    pub async fn shutdown(&mut self) {
        self.engine.shutdown();
        self.expect("stopped", |u| (u == &EngineUpdate::Stopped).then_some(())).await;
    }
}

pub fn reply_jpeg(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
    JpegEncoder::default().encode(&image).unwrap()
}
