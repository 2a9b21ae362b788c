//! Scan, select and reference upload through the engine.

mod common;

use approx::assert_relative_eq;
use common::{Calls, FakeBackend, Harness};
use facelink_client::{Command, EngineUpdate};
use facelink_core::{BoundingBox, DetectedFace};

fn face(index: i64, bbox: [f64; 4]) -> DetectedFace {
    DetectedFace { index, bbox: BoundingBox::from(bbox), score: 0.98 }
}

async fn selection_failure(h: &mut Harness) -> String {
    h.expect("selection failure", |u| match u {
        EngineUpdate::TargetSelectionFailed(message) => Some(message.clone()),
        _ => None,
    })
    .await
}

#[tokio::test(start_paused = true)]
async fn select_before_scan_is_refused_locally() {
    let mut h = Harness::start(FakeBackend::default());
    h.engine.send(Command::SelectFace(0));
    assert_eq!(selection_failure(&mut h).await, "You must scan faces first");
    assert_eq!(Calls::get(&h.backend.calls.select), 0);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scan_without_camera_reports_no_frame() {
    let mut h = Harness::start(FakeBackend::default());
    h.engine.send(Command::ScanFaces);
    h.expect("scan failure", |u| matches!(u, EngineUpdate::FaceScanFailed(_)).then_some(())).await;
    assert_eq!(Calls::get(&h.backend.calls.detect), 0);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scan_then_select_sets_the_target() {
    let mut h = Harness::start(FakeBackend::with_faces(vec![
        face(0, [8.0, 4.0, 24.0, 20.0]),
        face(3, [32.0, 0.0, 64.0, 36.0]),
    ]));
    h.engine.send(Command::StartCamera);
    h.engine.send(Command::ScanFaces);

    let (message, faces, overlays, preview) = h
        .expect("faces", |u| match u {
            EngineUpdate::FacesDetected { message, faces, overlays, preview_url } => {
                Some((message.clone(), faces.clone(), overlays.clone(), preview_url.clone()))
            }
            _ => None,
        })
        .await;
    assert_eq!(message, "Faces found: 2");
    assert_eq!(faces.len(), 2);
    // Still is the 64x36 source at native size.
    assert_relative_eq!(overlays[0].left, 8.0 / 64.0);
    assert_relative_eq!(overlays[0].top, 4.0 / 36.0);
    assert_relative_eq!(overlays[1].width, 0.5);
    assert_relative_eq!(overlays[1].height, 1.0);
    assert!(preview.is_some_and(|url| h.store.contents(&url).is_some()));

    h.engine.send(Command::SelectFace(1));
    assert!(selection_failure(&mut h).await.contains('1'));
    assert_eq!(Calls::get(&h.backend.calls.select), 0);

    h.engine.send(Command::SelectFace(3));
    h.expect("selected", |u| (u == &EngineUpdate::TargetSelected(3)).then_some(())).await;
    assert_eq!(Calls::get(&h.backend.calls.select), 1);

    // With a target, submission needs no confirmation.
    let video = tempfile::Builder::new().suffix(".mov").tempfile().unwrap();
    h.engine.send(Command::SubmitVideo {
        path: video.path().to_path_buf(),
        proceed_without_target: false,
    });
    h.expect("job started", |u| matches!(u, EngineUpdate::Job(_)).then_some(())).await;

    h.shutdown().await;
    assert_eq!(h.store.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn rescan_replaces_the_preview() {
    let mut h = Harness::start(FakeBackend::with_faces(vec![face(0, [0.0, 0.0, 10.0, 10.0])]));
    h.engine.send(Command::StartCamera);
    for _ in 0..3 {
        h.engine.send(Command::ScanFaces);
        h.expect("faces", |u| matches!(u, EngineUpdate::FacesDetected { .. }).then_some(())).await;
    }
    assert_eq!(h.store.created(), 3);
    assert_eq!(h.store.live(), 1);
    h.shutdown().await;
    assert_eq!(h.store.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn reference_upload_builds_thumbnail_url() {
    let mut h = Harness::start(FakeBackend::default());
    let mut image = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    std::io::Write::write_all(&mut image, b"\xFF\xD8\xFF\xD9").unwrap();

    h.engine.send(Command::UploadReference(image.path().to_path_buf()));
    let identity = h
        .expect("reference", |u| match u {
            EngineUpdate::ReferenceUploaded(identity) => Some(identity.clone()),
            _ => None,
        })
        .await;
    assert_eq!(identity.id.as_deref(), Some("ref-1"));
    let thumb = identity.thumbnail_url.unwrap();
    assert!(thumb.starts_with("http://backend.test/reference-thumb?ts="), "{}", thumb);

    h.engine.send(Command::UploadReference("/nonexistent/face.jpg".into()));
    h.expect("upload failure", |u| {
        matches!(u, EngineUpdate::ReferenceFailed(_)).then_some(())
    })
    .await;
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn selection_landing_after_rescan_does_not_select_a_new_face() {
    let mut h = Harness::start(FakeBackend::with_faces(vec![face(4, [0.0, 0.0, 10.0, 10.0])]));
    h.expect("target state", |u| {
        matches!(u, EngineUpdate::TargetAvailable(false)).then_some(())
    })
    .await;
    h.engine.send(Command::StartCamera);
    h.engine.send(Command::ScanFaces);
    h.expect("faces", |u| matches!(u, EngineUpdate::FacesDetected { .. }).then_some(())).await;

    h.backend.set_faces(vec![face(0, [20.0, 0.0, 40.0, 30.0])]);
    *h.backend.select_delay.lock().unwrap() = std::time::Duration::from_secs(2);
    h.engine.send(Command::SelectFace(4));
    h.engine.send(Command::ScanFaces);

    let faces = h
        .expect("rescanned faces", |u| match u {
            EngineUpdate::FacesDetected { faces, .. } => Some(faces.clone()),
            _ => None,
        })
        .await;
    assert_eq!(faces.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0]);

    h.expect("target flag", |u| match u {
        EngineUpdate::TargetSelected(index) => {
            panic!("face {} from the old scan was selected", index)
        }
        EngineUpdate::TargetAvailable(true) => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(Calls::get(&h.backend.calls.select), 1);

    // Face 4 belonged to the replaced still.
    h.engine.send(Command::SelectFace(4));
    assert!(selection_failure(&mut h).await.contains('4'));
    h.shutdown().await;
}
