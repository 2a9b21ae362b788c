//! Video job orchestration: submit, poll, count down, fetch.
//!
//! ```text
//! Idle ──begin_submit──► Submitting ──on_submitted(Ok)──► Processing ──done──► Done
//!                             │                               │
//!                             └──────────── failure ──────────┴──error──► Error
//! ```
//!
//! | Timer | Period | Starts | Stops |
//! |-------|--------|--------|-------|
//! | poll | `poll_interval` | immediately on acceptance | `done`, error, new submission, shutdown |
//! | countdown | `countdown_interval` | one period after acceptance | terminal state, new submission, shutdown |
//!
//! Every tick and completion carries the submission number it belongs to;
//! anything from an earlier submission is ignored.

use std::time::{Duration, Instant};

use bytes::Bytes;
use facelink_core::resource::release;
use facelink_core::{BlobStore, FaceLinkError, JobError, JobStatus, ResourceHandle, VideoJob};
use facelink_transport::api::MSG_JOB_FAILED;
use facelink_transport::{JobStatusReport, RemoteJobStatus};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::timer::RepeatingTask;

pub const ETA_FACTOR: f64 = 1.1;
pub const ETA_OVERHEAD_SECS: f64 = 8.0;
pub const ETA_MIN_SECS: f64 = 10.0;
pub const ETA_MAX_SECS: f64 = 300.0;
pub const PROGRESS_EPSILON: f64 = 0.001;

/// `clamp(duration * 1.1 + 8, 10, 300)`. Unknown durations count as 0.
pub fn initial_eta(duration_secs: f64) -> f64 {
    let duration = if duration_secs.is_finite() && duration_secs > 0.0 {
        duration_secs
    } else {
        0.0
    };
    (duration * ETA_FACTOR + ETA_OVERHEAD_SECS).clamp(ETA_MIN_SECS, ETA_MAX_SECS)
}

pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 100.0)
    }
}

/// Remaining seconds extrapolated from progress so far; `None` at zero progress.
pub fn recompute_eta(elapsed_secs: f64, progress: f64) -> Option<f64> {
    if progress <= 0.0 {
        return None;
    }
    Some(elapsed_secs * (100.0 - progress) / progress.max(PROGRESS_EPSILON))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobPhase {
    #[default]
    Idle,
    Submitting,
    Processing,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTickKind {
    Poll,
    Countdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTick {
    pub submission: u64,
    pub kind: JobTickKind,
}

/// What the owner must do or report after feeding the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Ignored,
    Started(VideoJob),
    Updated(VideoJob),
    /// Issue a status request for this job id.
    PollDue(String),
    /// Download the result for this job id.
    FetchResult(String),
    Completed { job: VideoJob, url: String },
    Failed(String),
}

pub struct JobOrchestrator {
    phase: JobPhase,
    job: Option<VideoJob>,
    submission: u64,
    poll: Option<RepeatingTask>,
    countdown: Option<RepeatingTask>,
    status_pending: bool,
    result: Option<ResourceHandle>,
    last_error: Option<String>,
    tick_tx: mpsc::UnboundedSender<JobTick>,
    poll_interval: Duration,
    countdown_interval: Duration,
}

impl JobOrchestrator {
    pub fn new(
        tick_tx: mpsc::UnboundedSender<JobTick>,
        poll_interval: Duration,
        countdown_interval: Duration,
    ) -> Self {
        let min = Duration::from_millis(1);
        Self {
            phase: JobPhase::Idle,
            job: None,
            submission: 0,
            poll: None,
            countdown: None,
            status_pending: false,
            result: None,
            last_error: None,
            tick_tx,
            poll_interval: poll_interval.max(min),
            countdown_interval: countdown_interval.max(min),
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Number of the latest submission; completions must echo it back.
    pub fn submission(&self) -> u64 {
        self.submission
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, JobPhase::Submitting | JobPhase::Processing)
    }

    pub fn snapshot(&self) -> Option<&VideoJob> {
        self.job.as_ref()
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result.as_ref().map(ResourceHandle::url)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn timers_running(&self) -> (bool, bool) {
        (self.poll.is_some(), self.countdown.is_some())
    }

    /// Guard and prepare a submission. Returns its number; pass it back with
    /// the upload outcome.
    pub fn begin_submit(
        &mut self,
        has_target: bool,
        proceed_without_target: bool,
        store: &mut dyn BlobStore,
    ) -> Result<u64, JobError> {
        if self.is_active() {
            return Err(JobError::AlreadyActive);
        }
        if !has_target && !proceed_without_target {
            return Err(JobError::NoTargetSelected);
        }
        self.cancel_timers();
        release(store, &mut self.result);
        self.submission += 1;
        self.phase = JobPhase::Submitting;
        self.job = None;
        self.status_pending = false;
        self.last_error = None;
        info!("Submitting video (submission {})", self.submission);
        Ok(self.submission)
    }

    pub fn on_submitted(
        &mut self,
        submission: u64,
        result: Result<String, FaceLinkError>,
        duration_secs: f64,
        now: Instant,
    ) -> JobEvent {
        if submission != self.submission || self.phase != JobPhase::Submitting {
            return JobEvent::Ignored;
        }
        let job_id = match result {
            Ok(id) => id,
            Err(e) => return self.fail(e.user_message()),
        };

        let eta = initial_eta(duration_secs);
        info!("Job {} accepted (duration {:.1}s, ETA {:.0}s)", job_id, duration_secs, eta);
        let job = VideoJob::new(job_id, now, eta);
        self.job = Some(job.clone());
        self.phase = JobPhase::Processing;

        let tick = |kind| move || JobTick { submission, kind };
        self.countdown = Some(RepeatingTask::spawn(
            self.countdown_interval,
            false,
            self.tick_tx.clone(),
            tick(JobTickKind::Countdown),
        ));
        self.poll = Some(RepeatingTask::spawn(
            self.poll_interval,
            true,
            self.tick_tx.clone(),
            tick(JobTickKind::Poll),
        ));
        JobEvent::Started(job)
    }

    pub fn on_tick(&mut self, tick: JobTick) -> JobEvent {
        if tick.submission != self.submission || self.phase != JobPhase::Processing {
            return JobEvent::Ignored;
        }
        let Some(job) = self.job.as_mut() else {
            return JobEvent::Ignored;
        };
        match tick.kind {
            JobTickKind::Countdown => {
                if self.countdown.is_none() {
                    return JobEvent::Ignored;
                }
                let step = self.countdown_interval.as_secs_f64();
                job.eta_seconds = job.eta_seconds.map(|eta| (eta - step).max(0.0));
                JobEvent::Updated(job.clone())
            }
            JobTickKind::Poll => {
                if self.poll.is_none() {
                    return JobEvent::Ignored;
                }
                if self.status_pending {
                    debug!("poll skipped: status request outstanding");
                    return JobEvent::Ignored;
                }
                self.status_pending = true;
                JobEvent::PollDue(job.job_id.clone())
            }
        }
    }

    pub fn on_status(
        &mut self,
        submission: u64,
        result: Result<JobStatusReport, FaceLinkError>,
        now: Instant,
    ) -> JobEvent {
        if submission != self.submission || self.phase != JobPhase::Processing {
            return JobEvent::Ignored;
        }
        self.status_pending = false;
        let report = match result {
            Ok(report) => report,
            Err(e) => return self.fail(e.user_message()),
        };
        if !report.ok {
            return self.fail(FaceLinkError::rejected(report.msg, MSG_JOB_FAILED).user_message());
        }

        match report.status {
            RemoteJobStatus::Error => {
                self.fail(FaceLinkError::rejected(report.msg, MSG_JOB_FAILED).user_message())
            }
            RemoteJobStatus::Processing => {
                let Some(job) = self.job.as_mut() else {
                    return JobEvent::Ignored;
                };
                let progress = report.progress.map(clamp_progress).unwrap_or(job.progress_percent);
                job.status = JobStatus::Processing;
                job.progress_percent = progress;
                job.status_message = report
                    .msg
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Processing {:.0}%", progress));
                if let Some(eta) = recompute_eta(job.elapsed_secs(now), progress) {
                    job.eta_seconds = Some(eta);
                }
                debug!("job {}: {:.1}% ETA {:?}", job.job_id, progress, job.eta_seconds);
                JobEvent::Updated(job.clone())
            }
            RemoteJobStatus::Done => {
                if let Some(poll) = self.poll.take() {
                    poll.cancel();
                }
                let Some(job) = self.job.as_mut() else {
                    return JobEvent::Ignored;
                };
                job.status_message = "Downloading result".to_owned();
                info!("Job {} done, fetching result", job.job_id);
                JobEvent::FetchResult(job.job_id.clone())
            }
        }
    }

    pub fn on_result(
        &mut self,
        submission: u64,
        result: Result<Bytes, FaceLinkError>,
        store: &mut dyn BlobStore,
    ) -> JobEvent {
        if submission != self.submission || self.phase != JobPhase::Processing {
            return JobEvent::Ignored;
        }
        let data = match result {
            Ok(data) => data,
            Err(e) => return self.fail(e.user_message()),
        };
        let Some(job_id) = self.job.as_ref().map(|j| j.job_id.clone()) else {
            return JobEvent::Ignored;
        };
        let handle = match store.create(data, "video/mp4", &format!("processed_{}.mp4", job_id)) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e.user_message()),
        };

        self.cancel_timers();
        self.phase = JobPhase::Done;
        let url = handle.url().to_owned();
        self.result = Some(handle);
        let Some(job) = self.job.as_mut() else {
            return JobEvent::Ignored;
        };
        job.status = JobStatus::Done;
        job.progress_percent = 100.0;
        job.eta_seconds = Some(0.0);
        job.status_message = "Done".to_owned();
        info!("Job {} complete: {}", job.job_id, url);
        JobEvent::Completed { job: job.clone(), url }
    }

    /// Terminate the current job in the `Error` state.
    pub fn fail(&mut self, message: String) -> JobEvent {
        warn!("Video job failed: {}", message);
        self.cancel_timers();
        self.phase = JobPhase::Error;
        self.status_pending = false;
        if let Some(job) = self.job.as_mut() {
            job.status = JobStatus::Error;
            job.status_message = message.clone();
        }
        self.last_error = Some(message.clone());
        JobEvent::Failed(message)
    }

    /// Stop timers, drop the job, and revoke the result resource.
    pub fn shutdown(&mut self, store: &mut dyn BlobStore) {
        self.cancel_timers();
        release(store, &mut self.result);
        self.submission += 1;
        self.status_pending = false;
        if self.is_active() {
            debug!("active job abandoned");
            self.phase = JobPhase::Idle;
        }
    }

    fn cancel_timers(&mut self) {
        for task in [self.poll.take(), self.countdown.take()].into_iter().flatten() {
            task.cancel();
        }
    }
}
