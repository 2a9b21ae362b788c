//! Request/response backend client.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`BackendApi::upload_reference`] | `POST /upload-reference` (multipart `img`) |
//! | [`BackendApi::reference_info`] | `GET /reference-info` |
//! | [`BackendApi::target_info`] | `GET /target-info` |
//! | [`BackendApi::detect_faces`] | `POST /detect-faces` (multipart `img`) |
//! | [`BackendApi::select_target`] | `POST /select-target` (multipart `img` + `idx`) |
//! | [`BackendApi::process_video`] | `POST /process-video` (multipart `file`) |
//! | [`BackendApi::job_status`] | `GET /job-status/{id}` |
//! | [`BackendApi::job_result`] | `GET /job-result/{id}` (binary) |
//!
//! Responses with `ok: false` become [`FaceLinkError::Rejected`] carrying the
//! server's `msg`, or a generic message when it sent none.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use facelink_core::{DetectedFace, FaceLinkError, TransportError};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const MSG_REFERENCE_REJECTED: &str = "Server did not accept the image (no face?)";
pub const MSG_DETECT_FAILED: &str = "Face detection failed";
pub const MSG_SELECT_FAILED: &str = "Face selection failed";
pub const MSG_VIDEO_REJECTED: &str = "Server did not accept the video";
pub const MSG_JOB_FAILED: &str = "Video processing failed";

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReferenceInfo {
    #[serde(default)]
    pub id: Option<String>,
    /// Origin-relative thumbnail path, e.g. `/reference-thumb`.
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub has_face: bool,
}

#[derive(Debug, Deserialize)]
struct UploadReferenceResponse {
    #[serde(default)]
    ok: bool,
    id: Option<String>,
    thumb: Option<String>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetInfoResponse {
    #[serde(default)]
    has_target: bool,
}

#[derive(Debug, Deserialize)]
struct DetectFacesResponse {
    #[serde(default)]
    ok: bool,
    count: Option<usize>,
    #[serde(default)]
    faces: Vec<DetectedFace>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    #[serde(default)]
    ok: bool,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessVideoResponse {
    #[serde(default)]
    ok: bool,
    job_id: Option<String>,
    msg: Option<String>,
}

/// Job state as reported by `/job-status/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteJobStatus {
    Processing,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobStatusReport {
    #[serde(default = "default_true")]
    pub ok: bool,
    pub status: RemoteJobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub msg: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Successful detection result.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub faces: Vec<DetectedFace>,
    pub count: usize,
}

/// A video file to submit.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub file_name: String,
    pub mime: String,
    pub data: Bytes,
}

// ── BackendApi ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn upload_reference(
        &self,
        file_name: &str,
        image: Bytes,
    ) -> Result<ReferenceInfo, FaceLinkError>;

    async fn reference_info(&self) -> Result<ReferenceInfo, FaceLinkError>;

    async fn target_info(&self) -> Result<bool, FaceLinkError>;

    async fn detect_faces(&self, image: Bytes) -> Result<Detection, FaceLinkError>;

    async fn select_target(&self, image: Bytes, index: i64) -> Result<(), FaceLinkError>;

    /// Returns the job id.
    async fn process_video(&self, video: VideoUpload) -> Result<String, FaceLinkError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, FaceLinkError>;

    async fn job_result(&self, job_id: &str) -> Result<Bytes, FaceLinkError>;
}

// ── HttpBackend ───────────────────────────────────────────────────────────────

/// reqwest-based [`BackendApi`] rooted at a configurable origin.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    /// `timeout` bounds each whole request, body transfer included.
    pub fn new(origin: &str, timeout: Duration) -> Result<Self, FaceLinkError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(http_error)?;
        Self::with_client(client, origin)
    }

    pub fn with_client(client: reqwest::Client, origin: &str) -> Result<Self, FaceLinkError> {
        let base = Url::parse(origin)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| FaceLinkError::ConfigurationInvalid {
                reason: format!("backend origin is not a base URL: {}", origin),
            })?;
        Ok(Self { client, base })
    }

    pub fn origin(&self) -> String {
        self.base.origin().ascii_serialization()
    }

    /// Endpoint URL with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        form: Form,
    ) -> Result<T, FaceLinkError> {
        let url = self.url(segments);
        debug!("POST {}", url);
        let resp = self.client.post(url).multipart(form).send().await.map_err(http_error)?;
        read_json(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, FaceLinkError> {
        let url = self.url(segments);
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await.map_err(http_error)?;
        read_json(resp).await
    }
}

fn http_error(e: reqwest::Error) -> FaceLinkError {
    if e.is_timeout() {
        warn!("request timed out: {}", e);
    }
    TransportError::Http { reason: e.to_string() }.into()
}

fn jpeg_part(image: Bytes, file_name: &str) -> Result<Part, FaceLinkError> {
    Part::stream(image)
        .file_name(file_name.to_owned())
        .mime_str("image/jpeg")
        .map_err(http_error)
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FaceLinkError> {
    let status = resp.status();
    let body = resp.bytes().await.map_err(http_error)?;
    serde_json::from_slice(&body).map_err(|e| {
        if status.is_success() {
            TransportError::MalformedResponse { reason: e.to_string() }.into()
        } else {
            TransportError::Http { reason: format!("status {}", status) }.into()
        }
    })
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn upload_reference(
        &self,
        file_name: &str,
        image: Bytes,
    ) -> Result<ReferenceInfo, FaceLinkError> {
        let part = Part::stream(image).file_name(file_name.to_owned());
        let resp: UploadReferenceResponse = self
            .post_form(&["upload-reference"], Form::new().part("img", part))
            .await
            .map_err(|e| match e {
                // A body that is not JSON counts as a refusal.
                FaceLinkError::Transport(TransportError::MalformedResponse { .. }) => {
                    FaceLinkError::rejected(None, MSG_REFERENCE_REJECTED)
                }
                other => other,
            })?;
        if !resp.ok {
            return Err(FaceLinkError::rejected(resp.msg, MSG_REFERENCE_REJECTED));
        }
        info!("Reference uploaded (id={:?})", resp.id);
        Ok(ReferenceInfo { id: resp.id, thumb: resp.thumb, has_face: true })
    }

    async fn reference_info(&self) -> Result<ReferenceInfo, FaceLinkError> {
        self.get_json(&["reference-info"]).await
    }

    async fn target_info(&self) -> Result<bool, FaceLinkError> {
        let resp: TargetInfoResponse = self.get_json(&["target-info"]).await?;
        Ok(resp.has_target)
    }

    async fn detect_faces(&self, image: Bytes) -> Result<Detection, FaceLinkError> {
        let form = Form::new().part("img", jpeg_part(image, "frame.jpg")?);
        let resp: DetectFacesResponse = self.post_form(&["detect-faces"], form).await?;
        if !resp.ok {
            return Err(FaceLinkError::rejected(resp.msg, MSG_DETECT_FAILED));
        }
        let count = resp.count.unwrap_or(resp.faces.len());
        Ok(Detection { faces: resp.faces, count })
    }

    async fn select_target(&self, image: Bytes, index: i64) -> Result<(), FaceLinkError> {
        let form = Form::new()
            .part("img", jpeg_part(image, "frame.jpg")?)
            .text("idx", index.to_string());
        let resp: AckResponse = self.post_form(&["select-target"], form).await?;
        if !resp.ok {
            return Err(FaceLinkError::rejected(resp.msg, MSG_SELECT_FAILED));
        }
        Ok(())
    }

    async fn process_video(&self, video: VideoUpload) -> Result<String, FaceLinkError> {
        let part = Part::stream(video.data)
            .file_name(video.file_name)
            .mime_str(&video.mime)
            .map_err(http_error)?;
        let form = Form::new().part("file", part);
        let resp: ProcessVideoResponse = self.post_form(&["process-video"], form).await?;
        match (resp.ok, resp.job_id) {
            (true, Some(job_id)) => Ok(job_id),
            (_, _) => Err(FaceLinkError::rejected(resp.msg, MSG_VIDEO_REJECTED)),
        }
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, FaceLinkError> {
        self.get_json(&["job-status", job_id]).await
    }

    async fn job_result(&self, job_id: &str) -> Result<Bytes, FaceLinkError> {
        let resp = self
            .client
            .get(self.url(&["job-result", job_id]))
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?;
        resp.bytes().await.map_err(http_error)
    }
}
