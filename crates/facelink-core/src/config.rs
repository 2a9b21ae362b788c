use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::errors::FaceLinkError;

pub const DEFAULT_BACKEND_ORIGIN: &str = "http://127.0.0.1:8000";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws";

pub const ENV_BACKEND_ORIGIN: &str = "FACELINK_BACKEND_ORIGIN";
pub const ENV_WS_URL: &str = "FACELINK_WS_URL";
pub const ENV_UPLOAD_URL: &str = "FACELINK_UPLOAD_URL";

/// Capture-transmit loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    #[serde(alias = "targetWidth")]
    pub target_width: u32,
    #[serde(alias = "jpegQuality")]
    pub jpeg_quality: f32,
    #[serde(alias = "refreshHz")]
    pub refresh_hz: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_width: 960,
            jpeg_quality: 0.7,
            refresh_hz: 60,
        }
    }
}

impl CaptureSettings {
    /// Leaner profile: smaller canvas, lower quality, same refresh rate.
    pub fn lean(&self) -> Self {
        Self {
            target_width: 640,
            jpeg_quality: 0.65,
            refresh_hz: self.refresh_hz,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.refresh_hz.max(1) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub fps: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

impl RecordingSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.fps.max(1) as u64)
    }
}

/// Client configuration: backend endpoints, loop pacing, output location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(alias = "backendOrigin")]
    pub backend_origin: String,
    #[serde(alias = "wsUrl")]
    pub ws_url: String,
    pub capture: CaptureSettings,
    pub recording: RecordingSettings,
    #[serde(alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(alias = "countdownIntervalMs")]
    pub countdown_interval_ms: u64,
    #[serde(alias = "referenceRefreshSecs")]
    pub reference_refresh_secs: u64,
    /// Deadline for JSON calls, status polls, result downloads and the channel handshake.
    #[serde(alias = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,
    /// Deadline for reference and video uploads.
    #[serde(alias = "uploadTimeoutSecs")]
    pub upload_timeout_secs: u64,
    #[serde(alias = "outputDir")]
    pub output_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_origin: DEFAULT_BACKEND_ORIGIN.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            capture: CaptureSettings::default(),
            recording: RecordingSettings::default(),
            poll_interval_ms: 1_000,
            countdown_interval_ms: 1_000,
            reference_refresh_secs: 5,
            request_timeout_secs: 30,
            upload_timeout_secs: 300,
            output_dir: std::env::temp_dir().join("facelink"),
        }
    }
}

impl ClientConfig {
    /// Load a JSON config file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, FaceLinkError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| FaceLinkError::ConfigurationInvalid {
            reason: format!("{}: {}", path.display(), e),
        })
    }

    /// Apply `FACELINK_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_BACKEND_ORIGIN).ok(),
            std::env::var(ENV_WS_URL).ok(),
            std::env::var(ENV_UPLOAD_URL).ok(),
        );
    }

    /// An explicit origin wins over one derived from the upload URL.
    pub fn apply_overrides(
        &mut self,
        origin: Option<String>,
        ws_url: Option<String>,
        upload_url: Option<String>,
    ) {
        if let Some(origin) = origin {
            debug!("backend origin override: {}", origin);
            // Left as given when unparsable so `validate` can report it.
            self.backend_origin = origin_of(&origin).unwrap_or(origin);
        } else if let Some(upload) = upload_url {
            self.backend_origin = origin_of(&upload).unwrap_or_else(|| {
                warn!("cannot derive origin from upload URL {:?}; using default", upload);
                DEFAULT_BACKEND_ORIGIN.to_owned()
            });
        }
        if let Some(ws) = ws_url {
            debug!("channel URL override: {}", ws);
            self.ws_url = ws;
        }
    }

    pub fn validate(&self) -> Result<(), FaceLinkError> {
        let invalid = |reason: String| Err(FaceLinkError::ConfigurationInvalid { reason });

        if origin_of(&self.backend_origin).is_none() {
            return invalid(format!("backend origin must be http(s): {}", self.backend_origin));
        }
        if !is_channel_url(&self.ws_url) {
            return invalid(format!("channel URL must be ws(s) with a host: {}", self.ws_url));
        }
        if self.capture.target_width == 0 {
            return invalid("capture target width must be positive".into());
        }
        if !(self.capture.jpeg_quality > 0.0 && self.capture.jpeg_quality <= 1.0) {
            return invalid(format!("jpeg quality {} outside (0, 1]", self.capture.jpeg_quality));
        }
        if self.capture.refresh_hz == 0 || self.recording.fps == 0 {
            return invalid("refresh rate and recording fps must be positive".into());
        }
        let periods = [
            self.poll_interval_ms,
            self.countdown_interval_ms,
            self.reference_refresh_secs,
            self.request_timeout_secs,
            self.upload_timeout_secs,
        ];
        if periods.contains(&0) {
            return invalid("timer periods and request timeouts must be positive".into());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }

    pub fn reference_refresh(&self) -> Duration {
        Duration::from_secs(self.reference_refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

/// `scheme://host[:port]` of an http(s) URL, or `None` if it does not parse.
pub fn origin_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.origin().ascii_serialization())
}

fn is_channel_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| {
        matches!(u.scheme(), "ws" | "wss") && u.host_str().is_some_and(|h| !h.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "backendOrigin": "http://10.0.0.5:8000",
            "wsUrl": "ws://10.0.0.5:8000/ws",
            "capture": {"targetWidth": 640, "jpegQuality": 0.65},
            "pollIntervalMs": 500,
            "requestTimeoutSecs": 10
        }"#;

        let cfg: ClientConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.backend_origin, "http://10.0.0.5:8000");
        assert_eq!(cfg.capture.target_width, 640);
        assert_eq!(cfg.capture.refresh_hz, 60);
        assert_eq!(cfg.poll_interval_ms, 500);
        assert_eq!(cfg.countdown_interval_ms, 1_000);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.upload_timeout(), Duration::from_secs(300));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserializes_snake_case_fields() {
        let json = r#"{
            "backend_origin": "https://swap.example.com",
            "ws_url": "wss://swap.example.com/ws",
            "recording": {"fps": 24}
        }"#;

        let cfg: ClientConfig = serde_json::from_str(json).expect("valid snake_case config");
        assert_eq!(cfg.recording.fps, 24);
        assert_eq!(cfg.recording.frame_interval(), Duration::from_micros(41_666));
        assert!(cfg.validate().is_ok());
    }

    #[rstest]
    #[case("http://192.168.1.7:9000/upload-reference", "http://192.168.1.7:9000")]
    #[case("HTTP://10.0.0.5:8000/upload-reference", "http://10.0.0.5:8000")]
    #[case("https://swap.example.com:443/api/upload?x=1", "https://swap.example.com")]
    fn origin_derived_from_upload_url(#[case] upload: &str, #[case] expected: &str) {
        let mut cfg = ClientConfig::default();
        cfg.apply_overrides(None, None, Some(upload.into()));
        assert_eq!(cfg.backend_origin, expected);
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://files.example.com/upload")]
    #[case("http://")]
    fn unusable_upload_url_falls_back_to_default_origin(#[case] upload: &str) {
        let mut cfg = ClientConfig::default();
        cfg.backend_origin = "http://elsewhere:1".into();
        cfg.apply_overrides(None, None, Some(upload.into()));
        assert_eq!(cfg.backend_origin, DEFAULT_BACKEND_ORIGIN);
    }

    #[test]
    fn explicit_origin_wins_over_upload_url() {
        let mut cfg = ClientConfig::default();
        cfg.apply_overrides(
            Some("http://a:1/".into()),
            Some("ws://a:1/ws".into()),
            Some("http://b:2/upload-reference".into()),
        );
        assert_eq!(cfg.backend_origin, "http://a:1");
        assert_eq!(cfg.ws_url, "ws://a:1/ws");
    }

    #[rstest]
    #[case("http://127.0.0.1:8000/ws")]
    #[case("ws://")]
    #[case("ftp://10.0.0.5/ws")]
    #[case("127.0.0.1:8000/ws")]
    fn validate_rejects_bad_channel_urls(#[case] ws: &str) {
        let mut cfg = ClientConfig::default();
        cfg.ws_url = ws.into();
        assert!(cfg.validate().is_err(), "{} accepted", ws);
    }

    #[test]
    fn validate_accepts_uppercase_schemes() {
        let mut cfg = ClientConfig::default();
        cfg.ws_url = "WS://10.0.0.5:8000/ws".into();
        cfg.backend_origin = "HTTPS://swap.example.com".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ClientConfig::default();
        cfg.backend_origin = "swap.example.com".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.capture.jpeg_quality = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.capture.target_width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.request_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn lean_profile_keeps_refresh_rate() {
        let base = CaptureSettings { refresh_hz: 30, ..CaptureSettings::default() };
        let lean = base.lean();
        assert_eq!(lean.target_width, 640);
        assert_eq!(lean.refresh_hz, 30);
        assert!(lean.jpeg_quality < base.jpeg_quality);
    }

    #[test]
    fn tick_intervals() {
        assert_eq!(CaptureSettings::default().tick_interval(), Duration::from_micros(16_666));
        assert_eq!(RecordingSettings::default().frame_interval(), Duration::from_micros(33_333));
    }
}
