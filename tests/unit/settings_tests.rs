//! Unit tests for TOML operational settings.

use std::time::Duration;

use ingest_orchestrator::config::TimingConfig;
use ingest_orchestrator::{AppError, Settings};

#[test]
fn empty_document_yields_defaults() {
    let settings = Settings::from_toml_str("").expect("empty settings are valid");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.daemon.program, "gstd");
    assert_eq!(settings.daemon.address, "127.0.0.1");
    assert_eq!(settings.daemon.port, 5000);
    assert!(settings.daemon.manage);
    assert_eq!(settings.connection.retries, 3);
    assert_eq!(settings.retry_delay(), Duration::from_secs(1));
    assert_eq!(settings.timings.camera_settle(), Duration::from_secs(10));
    assert_eq!(settings.timings.transcoder_spinup(), Duration::from_secs(3));
    assert_eq!(settings.timings.snapshot_execute(), Duration::from_secs(2));
    assert_eq!(settings.timings.drain(), Duration::from_secs(10));
    assert!((settings.stream.assumed_bitrate_mbps - 5.5).abs() < f64::EPSILON);
    assert!(!settings.capture.serialize_shared_captures);
}

#[test]
fn partial_sections_override_only_named_fields() {
    let settings = Settings::from_toml_str(
        r#"
[daemon]
port = 5100
manage = false

[timings]
drain_ms = 250

[capture]
serialize_shared_captures = true
"#,
    )
    .expect("valid settings");
    assert_eq!(settings.daemon.port, 5100);
    assert!(!settings.daemon.manage);
    assert_eq!(settings.daemon.program, "gstd");
    assert_eq!(settings.timings.drain(), Duration::from_millis(250));
    assert_eq!(settings.timings.camera_settle(), Duration::from_secs(10));
    assert!(settings.capture.serialize_shared_captures);
}

#[test]
fn invalid_toml_is_config_error() {
    let err = Settings::from_toml_str("[daemon\nport = 1").unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid settings")));
}

#[test]
fn out_of_range_values_are_rejected() {
    assert!(Settings::from_toml_str("[daemon]\ndebug_level = 10\n").is_err());
    assert!(Settings::from_toml_str("[connection]\nretries = 0\n").is_err());
    assert!(Settings::from_toml_str("[stream]\nassumed_bitrate_mbps = 0.0\n").is_err());
    assert!(Settings::from_toml_str("[stream]\nbuffer_safety_multiple = -1.0\n").is_err());
}

#[test]
fn load_from_missing_path_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Settings::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn immediate_timings_are_zero() {
    let timings = TimingConfig::immediate();
    assert_eq!(timings.camera_settle(), Duration::ZERO);
    assert_eq!(timings.video_finalize(), Duration::ZERO);
}

#[test]
fn daemon_http_table_enables_the_http_protocol() {
    assert_eq!(Settings::default().daemon.http, None);

    let settings = Settings::from_toml_str("[daemon.http]\nport = 5100\n").expect("valid");
    let http = settings.daemon.http.expect("http enabled");
    assert_eq!(http.address, "127.0.0.1");
    assert_eq!(http.port, 5100);
}
