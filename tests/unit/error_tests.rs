//! Unit tests for `AppError` display format and conversions.

use ingest_orchestrator::AppError;

#[test]
fn display_prefixes_category() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Storage("x".into()), "storage unavailable: x"),
        (AppError::DaemonUnreachable("x".into()), "daemon unreachable: x"),
        (AppError::InvalidTrigger("x".into()), "invalid trigger: x"),
        (AppError::DuplicateCameraName("camA".into()), "duplicate camera name: camA"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn daemon_command_names_operation_and_pipeline() {
    let err = AppError::daemon_command("record_h264", "play", "no such pipeline");
    assert_eq!(
        err.to_string(),
        "daemon command play on record_h264 failed: no such pipeline"
    );
}

#[test]
fn messages_have_no_trailing_period() {
    let err = AppError::InvalidRecordingTemplate("needs %05d".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("denied")));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::InvalidState("x".into()));
}
