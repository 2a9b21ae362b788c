//! `facelink`: command-line FaceLink client.
//!
//! ```text
//! facelink [--config FILE] [--backend ORIGIN] [--ws URL] [--upload-url URL] [--out DIR] <command>
//!
//!   stream    (--frames DIR | --synthetic) [--lean] [--seconds N] [--record] [--save PATH]
//!   scan      (--frames DIR | --synthetic) [--select IDX]
//!   submit    VIDEO [--yes] [--save PATH]
//!   reference IMAGE
//! ```
//!
//! Configuration precedence: defaults → `--config` JSON → `FACELINK_*`
//! environment → flags.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use facelink_capture::{
    FfprobeDurationProbe, ImageDirSource, JpegEncoder, MediaSource, SharedSource, SyntheticSource,
};
use facelink_client::{Command, Engine, EngineDeps, EngineHandle, EngineUpdate, MjpegMuxer};
use facelink_core::resource::file_path;
use facelink_core::{ClientConfig, ConnectionState, FileBlobStore, JobError, RecordingState};
use facelink_transport::{HttpBackend, WsConnector};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Encode quality for detection stills.
const STILL_QUALITY: f32 = 0.9;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const TARGET_STATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Live face-swap client: stream frames, pick a target face, process videos.
#[derive(Parser)]
#[command(name = "facelink", version)]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend origin, e.g. http://127.0.0.1:8000.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Frame channel URL, e.g. ws://127.0.0.1:8000/ws.
    #[arg(long, global = true)]
    ws: Option<String>,

    /// Legacy upload endpoint; its origin is used when --backend is absent.
    #[arg(long, global = true)]
    upload_url: Option<String>,

    /// Directory for downloadable resources.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Stream frames through the backend and render the replies.
    Stream {
        #[command(flatten)]
        source: SourceArgs,

        /// Smaller, lower-quality frames at the same refresh rate.
        #[arg(long)]
        lean: bool,

        /// Stop after this many seconds (default: until Ctrl-C or channel close).
        #[arg(long)]
        seconds: Option<u64>,

        /// Record the processed output.
        #[arg(long)]
        record: bool,

        /// Where to copy the recording.
        #[arg(long, requires = "record")]
        save: Option<PathBuf>,
    },
    /// Capture a still, detect faces, optionally select one as the target.
    Scan {
        #[command(flatten)]
        source: SourceArgs,

        /// Face index to select as the backend target.
        #[arg(long)]
        select: Option<i64>,
    },
    /// Submit a video for processing and follow it to completion.
    Submit {
        video: PathBuf,

        /// Proceed even if no target face is selected.
        #[arg(long)]
        yes: bool,

        /// Where to copy the processed video.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Upload a reference face image.
    Reference { image: PathBuf },
}

#[derive(Args)]
struct SourceArgs {
    /// Directory of JPEG/PNG frames standing in for a camera.
    #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
    frames: Option<PathBuf>,

    /// Generated test pattern instead of frames.
    #[arg(long)]
    synthetic: bool,
}

impl SourceArgs {
    fn build(&self) -> Box<dyn MediaSource> {
        match &self.frames {
            Some(dir) => Box::new(ImageDirSource::new(dir.clone())),
            None => Box::new(SyntheticSource::new(1280, 720)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    info!("FaceLink client v{} (backend {})", env!("CARGO_PKG_VERSION"), config.backend_origin);

    let result = match cli.command {
        Cmd::Stream { source, lean, seconds, record, save } => {
            let mut config = config.clone();
            if lean {
                config.capture = config.capture.lean();
                info!(
                    "Lean capture: {}px wide at quality {:.2}",
                    config.capture.target_width, config.capture.jpeg_quality
                );
            }
            run_stream(&config, source.build(), seconds, record, save).await
        }
        Cmd::Scan { source, select } => run_scan(&config, source.build(), select).await,
        Cmd::Submit { video, yes, save } => run_submit(&config, video, yes, save).await,
        Cmd::Reference { image } => run_reference(&config, image).await,
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            ClientConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => ClientConfig::default(),
    };
    config.apply_env();
    config.apply_overrides(cli.backend.clone(), cli.ws.clone(), cli.upload_url.clone());
    if let Some(out) = &cli.out {
        config.output_dir = out.clone();
    }
    config.validate()?;
    Ok(config)
}

fn start_engine(
    config: &ClientConfig,
    source: Box<dyn MediaSource>,
) -> Result<(EngineHandle, UnboundedReceiver<EngineUpdate>)> {
    let backend = HttpBackend::new(&config.backend_origin, config.upload_timeout())?;
    let deps = EngineDeps {
        source: SharedSource::new(source),
        capture_encoder: Box::new(JpegEncoder::new(config.capture.jpeg_quality)),
        still_encoder: Arc::new(JpegEncoder::new(STILL_QUALITY)),
        backend: Arc::new(backend),
        connector: Arc::new(WsConnector),
        store: Box::new(FileBlobStore::new(config.output_dir.clone())),
        probe: Arc::new(FfprobeDurationProbe::new()),
        muxer: Arc::new(MjpegMuxer::default()),
    };
    Ok(Engine::spawn(config.clone(), deps))
}

// ── Subcommands ───────────────────────────────────────────────────────────────

async fn run_stream(
    config: &ClientConfig,
    source: Box<dyn MediaSource>,
    seconds: Option<u64>,
    record: bool,
    save: Option<PathBuf>,
) -> Result<()> {
    let (engine, mut updates) = start_engine(config, source)?;
    engine.send(Command::StartCamera);
    engine.send(Command::Connect);

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut recording = false;
    let mut failure = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = sleep_until_opt(deadline) => {
                info!("Stream time elapsed");
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else { break };
                match update {
                    EngineUpdate::FrameRendered { width, height, frames } => {
                        if record && !recording {
                            engine.send(Command::StartRecording);
                            recording = true;
                        }
                        if frames % 60 == 1 {
                            info!("{} frames rendered ({}x{})", frames, width, height);
                        }
                    }
                    EngineUpdate::Connection(ConnectionState::Disconnected) => {
                        info!("Channel disconnected");
                        break;
                    }
                    EngineUpdate::Error(message) => {
                        error!("{}", message);
                        failure = Some(message);
                    }
                    other => log_update(&other),
                }
            }
        }
    }

    // A connect failure reports its error after the state change.
    while let Ok(update) = updates.try_recv() {
        if let EngineUpdate::Error(message) = update {
            failure = Some(message);
        }
    }

    let mut outcome = Ok(());
    if recording {
        engine.send(Command::StopRecording);
        let url = wait_for(&mut updates, |u| match u {
            EngineUpdate::Recording { state: RecordingState::Stopped, url: Some(url) } => {
                Some(Ok(url))
            }
            EngineUpdate::Error(message) => Some(Err(anyhow!(message))),
            _ => None,
        })
        .await;
        outcome = match url {
            Ok(url) => save_resource(&url, save.as_deref()).await,
            Err(e) => Err(e),
        };
    } else if let Some(message) = failure {
        outcome = Err(anyhow!(message));
    }

    shutdown(&engine, &mut updates).await;
    outcome
}

async fn run_scan(
    config: &ClientConfig,
    source: Box<dyn MediaSource>,
    select: Option<i64>,
) -> Result<()> {
    let (engine, mut updates) = start_engine(config, source)?;
    engine.send(Command::StartCamera);
    engine.send(Command::ScanFaces);

    let outcome = async {
        let (message, faces, overlays) = wait_for(&mut updates, |u| match u {
            EngineUpdate::FacesDetected { message, faces, overlays, .. } => {
                Some(Ok((message, faces, overlays)))
            }
            EngineUpdate::FaceScanFailed(message) => Some(Err(anyhow!(message))),
            other => {
                log_update(&other);
                None
            }
        })
        .await?;

        println!("{}", message);
        for (face, overlay) in faces.iter().zip(&overlays) {
            println!(
                "  idx={:<3} bbox=[{:.0}, {:.0}, {:.0}, {:.0}] score={:.2}",
                face.index, face.bbox.x1, face.bbox.y1, face.bbox.x2, face.bbox.y2, face.score,
            );
            println!(
                "       overlay left={:.1}% top={:.1}% width={:.1}% height={:.1}%",
                overlay.left * 100.0,
                overlay.top * 100.0,
                overlay.width * 100.0,
                overlay.height * 100.0,
            );
        }

        if let Some(index) = select {
            engine.send(Command::SelectFace(index));
            wait_for(&mut updates, |u| match u {
                EngineUpdate::TargetSelected(i) if i == index => Some(Ok(())),
                EngineUpdate::TargetSelectionFailed(message) => Some(Err(anyhow!(message))),
                _ => None,
            })
            .await?;
            println!("Target face {} selected", index);
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    shutdown(&engine, &mut updates).await;
    outcome
}

async fn run_submit(
    config: &ClientConfig,
    video: PathBuf,
    yes: bool,
    save: Option<PathBuf>,
) -> Result<()> {
    if !video.is_file() {
        bail!("{} is not a file", video.display());
    }
    let (engine, mut updates) = start_engine(config, Box::new(SyntheticSource::new(16, 16)))?;

    // The engine refreshes target state on start; wait for it before submitting.
    let target = timeout(
        TARGET_STATE_TIMEOUT,
        wait_for(&mut updates, |u| match u {
            EngineUpdate::TargetAvailable(has_target) => Some(Ok(has_target)),
            _ => None,
        }),
    )
    .await;
    match target {
        Ok(Ok(true)) => info!("Backend target face is set"),
        Ok(Ok(false)) if yes => warn!("No target face selected; processing with the default face"),
        Ok(Ok(false)) => warn!("No target face selected"),
        _ => warn!("Could not read target state from the backend"),
    }

    engine.send(Command::SubmitVideo { path: video, proceed_without_target: yes });
    let outcome = wait_for(&mut updates, |u| match u {
        EngineUpdate::Job(job) => {
            info!(
                "[{}] {:?} {:.0}% ETA {}: {}",
                job.job_id,
                job.status,
                job.progress_percent,
                job.eta_seconds.map(|e| format!("{:.0}s", e)).unwrap_or_else(|| "?".into()),
                job.status_message
            );
            None
        }
        EngineUpdate::JobDone { url, .. } => Some(Ok(url)),
        EngineUpdate::JobFailed(message) => Some(Err(anyhow!(message))),
        EngineUpdate::JobRejected(JobError::NoTargetSelected) => {
            Some(Err(anyhow!("No target face selected; rerun with --yes to use the default face")))
        }
        EngineUpdate::JobRejected(e) => Some(Err(e.into())),
        _ => None,
    })
    .await;

    let outcome = match outcome {
        Ok(url) => save_resource(&url, save.as_deref()).await,
        Err(e) => Err(e),
    };
    shutdown(&engine, &mut updates).await;
    outcome
}

async fn run_reference(config: &ClientConfig, image: PathBuf) -> Result<()> {
    let (engine, mut updates) = start_engine(config, Box::new(SyntheticSource::new(16, 16)))?;
    engine.send(Command::UploadReference(image));
    let outcome = wait_for(&mut updates, |u| match u {
        EngineUpdate::ReferenceUploaded(identity) => Some(Ok(identity)),
        EngineUpdate::ReferenceFailed(message) => Some(Err(anyhow!(message))),
        _ => None,
    })
    .await;

    if let Ok(identity) = &outcome {
        println!("Reference id: {}", identity.id.as_deref().unwrap_or("-"));
        if let Some(thumb) = &identity.thumbnail_url {
            println!("Thumbnail:    {}", thumb);
        }
    }
    shutdown(&engine, &mut updates).await;
    outcome.map(|_| ())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Feed updates to `pick` until it yields a result.
async fn wait_for<T>(
    updates: &mut UnboundedReceiver<EngineUpdate>,
    mut pick: impl FnMut(EngineUpdate) -> Option<Result<T>>,
) -> Result<T> {
    while let Some(update) = updates.recv().await {
        if let Some(result) = pick(update) {
            return result;
        }
    }
    bail!("engine stopped unexpectedly")
}

async fn shutdown(engine: &EngineHandle, updates: &mut UnboundedReceiver<EngineUpdate>) {
    engine.shutdown();
    let drained = timeout(SHUTDOWN_TIMEOUT, async {
        while let Some(update) = updates.recv().await {
            if update == EngineUpdate::Stopped {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!("Engine did not stop within {:?}", SHUTDOWN_TIMEOUT);
    }
}

/// Copy a `file://` resource out of the output directory before shutdown revokes it.
async fn save_resource(url: &str, dest: Option<&Path>) -> Result<()> {
    let src = file_path(url).ok_or_else(|| anyhow!("not a file resource: {}", url))?;
    let dest = match dest {
        Some(dest) => dest.to_path_buf(),
        None => PathBuf::from(default_name(&src)),
    };
    tokio::fs::copy(&src, &dest)
        .await
        .with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
    println!("Saved {}", dest.display());
    Ok(())
}

/// Resource file name without the store's numeric prefix.
fn default_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "facelink.out".to_owned());
    match name.split_once('-') {
        Some((id, rest)) if !rest.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
            rest.to_owned()
        }
        _ => name,
    }
}

fn log_update(update: &EngineUpdate) {
    match update {
        EngineUpdate::Connection(state) => info!("Channel {}", state),
        EngineUpdate::Camera { active } => info!("Camera {}", if *active { "on" } else { "off" }),
        EngineUpdate::Recording { state, url } => {
            info!("Recording {:?} {}", state, url.as_deref().unwrap_or(""))
        }
        EngineUpdate::Reference(identity) => info!("Reference identity {:?}", identity.id),
        EngineUpdate::TargetAvailable(has_target) => info!("Backend target set: {}", has_target),
        EngineUpdate::Error(message) => error!("{}", message),
        _ => {}
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
