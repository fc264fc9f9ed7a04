//! Shared helpers for orchestrator integration tests.
//!
//! Sessions run against the in-memory control channel with zero-length
//! timings and a daemon double that records start/stop calls.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ingest_orchestrator::config::TimingConfig;
use ingest_orchestrator::control::memory::{MemoryChannel, MemoryConnector};
use ingest_orchestrator::control::BoxFuture;
use ingest_orchestrator::daemon::DaemonControl;
use ingest_orchestrator::orchestrator::session_manager::{ConfigSource, Orchestrator};
use ingest_orchestrator::{Result, Settings};

/// Three cameras with persistent recording.
pub const THREE_CAMERA_RECORDING: &str = "\
[CAMERA]
name=camA
address=10.0.0.1
username=root
password=pw

[CAMERA]
name=camB
address=10.0.0.2
username=root
password=pw

[CAMERA]
name=camC
address=10.0.0.3
username=root
password=pw

[RECORDING]
segment_time=15
maximum_segment_files=4
";

/// Two cameras with every feature enabled.
pub const ALL_FEATURES: &str = "\
[CAMERA]
name=camA
address=10.0.0.1
username=root
password=pw

[CAMERA]
name=camB
address=10.0.0.2
username=root
password=pw

[IMAGE_SNAPSHOT]
location=snapshots/{camera}/still_{timestamp}.jpeg

[VIDEO_SNAPSHOT]
buffer_time=30
duration=5

[RECORDING]
location=recording/{camera}/seg_%05d.mp4
segment_time=1
";

/// Settings with no waits, one connection attempt and no managed daemon.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.timings = TimingConfig::immediate();
    settings.connection.retries = 1;
    settings.connection.retry_delay_ms = 0;
    settings.daemon.manage = false;
    settings
}

/// Daemon double recording `start` / `stop` calls.
#[derive(Debug, Clone, Default)]
pub struct RecordingDaemon {
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingDaemon {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl DaemonControl for RecordingDaemon {
    fn start(&self) -> BoxFuture<'_, Result<()>> {
        self.calls.lock().unwrap().push("start");
        Box::pin(async { Ok(()) })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        self.calls.lock().unwrap().push("stop");
        Box::pin(async { Ok(()) })
    }
}

/// Start a session under `root` with the given settings.
pub async fn start_with_settings(
    root: &Path,
    config: &str,
    channel: &Arc<MemoryChannel>,
    daemon: &RecordingDaemon,
    settings: Settings,
) -> Result<Orchestrator> {
    let connector = MemoryConnector::new(Arc::clone(channel));
    let daemon = daemon.clone();
    Orchestrator::start_with(
        root,
        ConfigSource::from_text(config),
        settings,
        &connector,
        move |_, _| Ok(Box::new(daemon) as Box<dyn DaemonControl>),
    )
    .await
}

/// Start a session under `root` with [`test_settings`].
pub async fn start_session(
    root: &Path,
    config: &str,
    channel: &Arc<MemoryChannel>,
    daemon: &RecordingDaemon,
) -> Result<Orchestrator> {
    start_with_settings(root, config, channel, daemon, test_settings()).await
}

/// Start a session and bring it to the running state with buffers playing.
pub async fn running_session(
    root: &Path,
    config: &str,
    channel: &Arc<MemoryChannel>,
) -> Orchestrator {
    let mut orchestrator = start_session(root, config, channel, &RecordingDaemon::default())
        .await
        .expect("session starts");
    orchestrator.start_cameras().await.expect("cameras start");
    orchestrator.start_buffers().await.expect("buffers start");
    orchestrator
}
