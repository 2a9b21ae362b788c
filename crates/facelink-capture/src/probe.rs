//! Local media duration probing for the initial job ETA.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds; 0 when it cannot be determined.
    async fn probe(&self, path: &Path) -> f64;
}

/// Runs `ffprobe` to read the container duration.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    program: String,
}

impl FfprobeDurationProbe {
    pub fn new() -> Self {
        Self { program: "ffprobe".to_owned() }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for FfprobeDurationProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe(&self, path: &Path) -> f64 {
        let output = Command::new(&self.program)
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let secs = parse_duration(&String::from_utf8_lossy(&out.stdout));
                debug!("probed {}: {:.2}s", path.display(), secs);
                secs
            }
            Ok(out) => {
                warn!("ffprobe failed on {} (status {})", path.display(), out.status);
                0.0
            }
            Err(e) => {
                warn!("ffprobe unavailable: {}", e);
                0.0
            }
        }
    }
}

/// Parse ffprobe's duration output; anything non-finite or negative is 0.
pub fn parse_duration(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0)
}

/// Fixed duration, for hosts that already know it.
#[derive(Debug, Clone, Copy)]
pub struct FixedDuration(pub f64);

#[async_trait]
impl DurationProbe for FixedDuration {
    async fn probe(&self, _path: &Path) -> f64 {
        self.0
    }
}
