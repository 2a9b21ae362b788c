//! Video job lifecycle driven through the engine with a scripted backend.

mod common;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use approx::assert_relative_eq;
use common::{done, errored, processing, Calls, FakeBackend, Harness};
use facelink_client::{Command, EngineUpdate};
use facelink_core::{JobError, JobStatus};
use tempfile::NamedTempFile;

fn video_file() -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    file.write_all(b"not really a video").unwrap();
    file
}

fn submit(h: &Harness, path: PathBuf, proceed_without_target: bool) {
    h.engine.send(Command::SubmitVideo { path, proceed_without_target });
}

#[tokio::test(start_paused = true)]
async fn eta_tracks_progress_and_result_is_downloadable() {
    let statuses = vec![processing(0.0), processing(50.0), done()];
    let mut h = Harness::start(FakeBackend::with_statuses(statuses));
    let video = video_file();
    submit(&h, video.path().to_path_buf(), true);

    let started = h
        .expect("job started", |u| match u {
            EngineUpdate::Job(job) if job.status == JobStatus::Submitted => Some(job.clone()),
            _ => None,
        })
        .await;
    assert_eq!(started.job_id, "job-1");
    assert_relative_eq!(started.eta_seconds.unwrap(), 41.0);

    // 0% keeps the initial estimate.
    let first = h
        .expect("first status", |u| match u {
            EngineUpdate::Job(job) if job.status == JobStatus::Processing => Some(job.clone()),
            _ => None,
        })
        .await;
    assert_eq!(first.status_message, "Processing 0%");
    assert_relative_eq!(first.eta_seconds.unwrap(), 41.0);

    // Second poll, one second in: elapsed * (100 - p) / p.
    let halfway = h
        .expect("50%", |u| match u {
            EngineUpdate::Job(job) if job.progress_percent == 50.0 => Some(job.clone()),
            _ => None,
        })
        .await;
    assert_relative_eq!(halfway.eta_seconds.unwrap(), 1.0, epsilon = 1e-6);
    assert_eq!(halfway.status_message, "Processing 50%");

    let (job, url) = h
        .expect("done", |u| match u {
            EngineUpdate::JobDone { job, url } => Some((job.clone(), url.clone())),
            _ => None,
        })
        .await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.progress_percent, 100.0);
    assert!(url.ends_with("processed_job-1.mp4"), "{}", url);
    assert_eq!(h.store.contents(&url), Some(h.backend.result.clone()));

    // Timers are gone once the job is done.
    let polls = Calls::get(&h.backend.calls.job_status);
    assert_eq!(polls, 3);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(Calls::get(&h.backend.calls.job_status), polls);
    assert_eq!(Calls::get(&h.backend.calls.job_result), 1);

    h.shutdown().await;
    assert_eq!(h.store.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_progress_is_clamped() {
    let statuses = vec![processing(150.0), processing(-5.0)];
    let mut h = Harness::start(FakeBackend::with_statuses(statuses));
    let video = video_file();
    submit(&h, video.path().to_path_buf(), true);

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let progress = h
            .expect("status update", |u| match u {
                EngineUpdate::Job(job) if job.status == JobStatus::Processing => {
                    Some(job.progress_percent)
                }
                _ => None,
            })
            .await;
        if seen.last() != Some(&progress) {
            seen.push(progress);
        }
    }
    assert_eq!(seen, vec![100.0, 0.0]);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn backend_error_fails_the_job_and_stops_polling() {
    let mut h = Harness::start(FakeBackend::with_statuses(vec![errored("corrupt file")]));
    let video = video_file();
    submit(&h, video.path().to_path_buf(), true);

    let message = h
        .expect("job failure", |u| match u {
            EngineUpdate::JobFailed(message) => Some(message.clone()),
            _ => None,
        })
        .await;
    assert_eq!(message, "corrupt file");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(Calls::get(&h.backend.calls.job_status), 1);
    assert_eq!(Calls::get(&h.backend.calls.job_result), 0);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn second_submission_is_rejected_without_network() {
    let mut h = Harness::start(FakeBackend::with_statuses(vec![]));
    let video = video_file();
    submit(&h, video.path().to_path_buf(), true);
    h.expect("job started", |u| matches!(u, EngineUpdate::Job(_)).then_some(())).await;

    submit(&h, video.path().to_path_buf(), true);
    let rejection = h
        .expect("rejection", |u| match u {
            EngineUpdate::JobRejected(e) => Some(e.clone()),
            _ => None,
        })
        .await;
    assert_eq!(rejection, JobError::AlreadyActive);
    assert_eq!(Calls::get(&h.backend.calls.process_video), 1);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missing_target_needs_confirmation() {
    let mut h = Harness::start(FakeBackend::with_statuses(vec![done()]));
    h.expect("target state", |u| {
        matches!(u, EngineUpdate::TargetAvailable(false)).then_some(())
    })
    .await;

    let video = video_file();
    submit(&h, video.path().to_path_buf(), false);
    let rejection = h
        .expect("rejection", |u| match u {
            EngineUpdate::JobRejected(e) => Some(e.clone()),
            _ => None,
        })
        .await;
    assert_eq!(rejection, JobError::NoTargetSelected);
    assert_eq!(Calls::get(&h.backend.calls.process_video), 0);

    submit(&h, video.path().to_path_buf(), true);
    h.expect("done", |u| matches!(u, EngineUpdate::JobDone { .. }).then_some(())).await;
    assert_eq!(Calls::get(&h.backend.calls.process_video), 1);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hung_status_request_times_out_and_frees_the_orchestrator() {
    let mut h = Harness::start(FakeBackend::with_statuses(vec![]));
    h.backend.stall_status.store(true, std::sync::atomic::Ordering::SeqCst);
    let video = video_file();
    submit(&h, video.path().to_path_buf(), true);

    let message = h
        .expect("job failure", |u| match u {
            EngineUpdate::JobFailed(message) => Some(message.clone()),
            _ => None,
        })
        .await;
    assert!(message.contains("Timeout after 30000ms"), "{}", message);
    // Polls while the request hung were skipped, not stacked.
    assert_eq!(Calls::get(&h.backend.calls.job_status), 1);

    h.backend.stall_status.store(false, std::sync::atomic::Ordering::SeqCst);
    h.backend.push_statuses(vec![processing(10.0), done()]);
    submit(&h, video.path().to_path_buf(), true);
    h.expect("done", |u| matches!(u, EngineUpdate::JobDone { .. }).then_some(())).await;
    assert_eq!(Calls::get(&h.backend.calls.process_video), 2);

    // Nothing from either submission keeps polling.
    let polls = Calls::get(&h.backend.calls.job_status);
    assert_eq!(polls, 3);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(Calls::get(&h.backend.calls.job_status), polls);
    h.shutdown().await;
}
