//! Construction-time failures unwind the whole session.

use std::fs;
use std::sync::Arc;

use ingest_orchestrator::control::memory::{MemoryChannel, MemoryConnector};
use ingest_orchestrator::control::{ControlRequest, Operation};
use ingest_orchestrator::daemon::DaemonControl;
use ingest_orchestrator::orchestrator::session_manager::{ConfigSource, Orchestrator};
use ingest_orchestrator::AppError;

use super::test_helpers::{
    start_session, test_settings, RecordingDaemon, ALL_FEATURES, THREE_CAMERA_RECORDING,
};

#[tokio::test]
async fn failed_create_tears_down_everything_created() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    channel.fail_when(|r| matches!(r, ControlRequest::Create { name, .. } if name == "encode_jpeg"));
    let daemon = RecordingDaemon::default();

    let err = start_session(dir.path(), ALL_FEATURES, &channel, &daemon)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DaemonCommand { ref operation, .. } if operation == "create"));
    assert!(channel.pipelines().is_empty());
    let deletes = channel
        .requests()
        .iter()
        .filter(|r| r.operation() == Operation::Delete)
        .count();
    assert_eq!(deletes, 6);
    assert_eq!(daemon.calls(), ["start", "stop"]);
}

#[tokio::test]
async fn failed_property_set_tears_down_the_new_pipeline_too() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    channel.fail_when(|r| {
        matches!(r, ControlRequest::SetProperty { property, .. } if property == "max-files")
    });

    let err = start_session(
        dir.path(),
        THREE_CAMERA_RECORDING,
        &channel,
        &RecordingDaemon::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::DaemonCommand { ref pipeline, .. } if pipeline == "record_h264"));
    assert!(channel.pipelines().is_empty());
}

#[tokio::test]
async fn unreachable_daemon_is_fatal_and_stops_the_daemon() {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = MemoryChannel::new();
    let connector = MemoryConnector::refusing(Arc::clone(&channel), 10);
    let daemon = RecordingDaemon::default();
    let handle = daemon.clone();

    let err = Orchestrator::start_with(
        dir.path(),
        ConfigSource::from_text(THREE_CAMERA_RECORDING),
        test_settings(),
        &connector,
        move |_, _| Ok(Box::new(handle) as Box<dyn DaemonControl>),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::DaemonUnreachable(_)));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(daemon.calls(), ["start", "stop"]);
    assert!(channel.requests().is_empty());
}

#[tokio::test]
async fn malformed_config_allocates_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = start_session(
        dir.path(),
        "[CAMERA]\nname=camA\n",
        &MemoryChannel::new(),
        &RecordingDaemon::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::InvalidCameraConfig(_)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn bad_recording_template_never_starts_the_daemon() {
    let dir = tempfile::tempdir().expect("tempdir");
    let daemon = RecordingDaemon::default();
    let text = format!("{THREE_CAMERA_RECORDING}location=rec/all_%05d.mp4\n");

    let err = start_session(dir.path(), &text, &MemoryChannel::new(), &daemon)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::MissingCameraPlaceholder(_)));
    assert!(daemon.calls().is_empty());
}

#[tokio::test]
async fn unwritable_recording_directory_is_a_storage_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let text = format!(
        "{THREE_CAMERA_RECORDING}location={}/{{camera}}/seg_%05d.mp4\n",
        blocker.display()
    );
    let channel = MemoryChannel::new();
    let daemon = RecordingDaemon::default();

    let err = start_session(dir.path(), &text, &channel, &daemon)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Storage(_)));
    assert!(channel.pipelines().is_empty());
    assert_eq!(daemon.calls(), ["start", "stop"]);
}
