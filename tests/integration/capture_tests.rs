//! Triggered image and video capture workers.

use std::fs;

use ingest_orchestrator::control::memory::MemoryChannel;
use ingest_orchestrator::control::{ControlRequest, Operation};
use ingest_orchestrator::orchestrator::session_manager::CameraSelector;
use ingest_orchestrator::AppError;

use super::test_helpers::{
    running_session, start_with_settings, test_settings, RecordingDaemon, ALL_FEATURES,
};

fn listen_to_values(requests: &[ControlRequest]) -> Vec<String> {
    requests
        .iter()
        .filter_map(|r| match r {
            ControlRequest::SetProperty {
                pipeline,
                property,
                value,
                ..
            } if pipeline == "encode_jpeg" && property == "listen-to" => Some(value.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn image_snapshot_visits_cameras_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let orchestrator = running_session(dir.path(), ALL_FEATURES, &channel).await;
    let before = channel.requests().len();

    let written = orchestrator
        .take_image_snapshot(&CameraSelector::All, None)
        .expect("trigger accepted")
        .await
        .expect("worker completes");
    assert_eq!(written, ["camA", "camB"]);

    let requests = channel.requests()[before..].to_vec();
    assert_eq!(listen_to_values(&requests), ["camA", "camB"]);

    let per_camera: Vec<(Operation, &str)> = requests[..6]
        .iter()
        .map(|r| (r.operation(), r.pipeline()))
        .collect();
    assert_eq!(
        per_camera,
        [
            (Operation::SetProperty, "snap_jpeg"),
            (Operation::SetProperty, "encode_jpeg"),
            (Operation::Play, "encode_jpeg"),
            (Operation::Play, "snap_jpeg"),
            (Operation::Stop, "snap_jpeg"),
            (Operation::Stop, "encode_jpeg"),
        ]
    );

    let session_dir = &orchestrator.session().directory;
    assert!(session_dir.join("snapshots/camA").is_dir());
    assert!(session_dir.join("snapshots/camB").is_dir());
}

#[tokio::test]
async fn failing_camera_is_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let orchestrator = running_session(dir.path(), ALL_FEATURES, &channel).await;
    channel.fail_when(|r| {
        matches!(r, ControlRequest::SetProperty { property, value, .. }
            if property == "listen-to" && value == "camA")
    });

    let written = orchestrator
        .take_image_snapshot(&CameraSelector::All, None)
        .expect("trigger accepted")
        .await
        .expect("worker completes");
    assert_eq!(written, ["camB"]);
}

#[tokio::test]
async fn camera_whose_directory_cannot_be_created_is_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let orchestrator = running_session(dir.path(), ALL_FEATURES, &channel).await;
    let snapshots = orchestrator.session().directory.join("snapshots");
    fs::create_dir_all(&snapshots).unwrap();
    fs::write(snapshots.join("camA"), "not a directory").unwrap();
    let before = channel.requests().len();

    let written = orchestrator
        .take_image_snapshot(&CameraSelector::All, None)
        .expect("trigger accepted")
        .await
        .expect("worker completes");

    assert_eq!(written, ["camB"]);
    let requests = channel.requests()[before..].to_vec();
    assert_eq!(listen_to_values(&requests), ["camB"]);
}

#[tokio::test]
async fn multi_camera_without_placeholder_is_rejected_before_any_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let orchestrator = running_session(dir.path(), ALL_FEATURES, &channel).await;
    let before = channel.requests().len();

    let err = orchestrator
        .take_image_snapshot(&CameraSelector::All, Some("snapshots/still.jpeg"))
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTrigger(_)));
    assert_eq!(channel.requests().len(), before);

    // A single camera needs no placeholder.
    let written = orchestrator
        .take_image_snapshot(
            &CameraSelector::Named(vec!["camB".into()]),
            Some("snapshots/still.jpeg"),
        )
        .expect("single camera accepted")
        .await
        .expect("worker completes");
    assert_eq!(written, ["camB"]);
}

#[tokio::test]
async fn unknown_camera_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let orchestrator = running_session(dir.path(), ALL_FEATURES, &channel).await;

    let err = orchestrator
        .take_image_snapshot(&CameraSelector::parse("camA,camZ"), None)
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTrigger(ref msg) if msg.contains("camZ")));
}

#[tokio::test(start_paused = true)]
async fn video_snapshot_plays_drains_and_stops() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let orchestrator = running_session(dir.path(), ALL_FEATURES, &channel).await;
    let before = channel.requests().len();

    let path = orchestrator
        .take_video_snapshot(Some(5), Some("clips/{camera}_{timestamp}.mp4"))
        .expect("trigger accepted")
        .await
        .expect("worker completes")
        .expect("capture succeeds");

    assert!(path.starts_with(&orchestrator.session().directory));
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("all_"));
    assert!(path.parent().unwrap().is_dir());

    let ops: Vec<(Operation, String)> = channel.requests()[before..]
        .iter()
        .map(|r| (r.operation(), r.pipeline().to_owned()))
        .collect();
    assert_eq!(
        ops,
        [
            (Operation::SetProperty, "snap_video".to_owned()),
            (Operation::Play, "snap_video".to_owned()),
            (Operation::EndOfStream, "snap_video".to_owned()),
            (Operation::Stop, "snap_video".to_owned()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn video_snapshot_failure_is_reported_through_the_handle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let orchestrator = running_session(dir.path(), ALL_FEATURES, &channel).await;
    channel.fail_when(|r| r.operation() == Operation::Play && r.pipeline() == "snap_video");

    let outcome = orchestrator
        .take_video_snapshot(None, None)
        .expect("trigger accepted")
        .await
        .expect("worker completes");
    assert!(matches!(outcome, Err(AppError::DaemonCommand { .. })));
}

#[tokio::test]
async fn serialized_captures_do_not_interleave() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let mut settings = test_settings();
    settings.capture.serialize_shared_captures = true;
    let mut orchestrator = start_with_settings(
        dir.path(),
        ALL_FEATURES,
        &channel,
        &RecordingDaemon::default(),
        settings,
    )
    .await
    .expect("session starts");
    orchestrator.start_cameras().await.expect("running");
    let before = channel.requests().len();

    let first = orchestrator
        .take_image_snapshot(&CameraSelector::All, None)
        .expect("accepted");
    let second = orchestrator
        .take_image_snapshot(&CameraSelector::All, None)
        .expect("accepted");
    assert_eq!(first.await.expect("joined").len(), 2);
    assert_eq!(second.await.expect("joined").len(), 2);

    let requests = channel.requests()[before..].to_vec();
    assert_eq!(
        listen_to_values(&requests),
        ["camA", "camB", "camA", "camB"]
    );
}
