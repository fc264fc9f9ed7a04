//! Session lifecycle: construction, steady state, triggers and teardown.
//!
//! The [`Orchestrator`] exclusively owns every pipeline handle of one
//! session. Construction errors unwind the whole session (teardown is
//! attempted, then the error is returned). Steady-state and teardown
//! failures are isolated per pipeline and logged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{DaemonConfig, Settings};
use crate::control::{Connector, ControlClient, Endpoint};
use crate::daemon::{DaemonControl, DaemonSupervisor, ExternalDaemon};
use crate::models::config::SessionConfig;
use crate::models::pipeline::{LifecycleState, PipelineGroup};
use crate::models::session::{Session, SessionState};
use crate::orchestrator::capture::{ImageCapture, ImageTargets, SharedCaptureLock, VideoCapture};
use crate::orchestrator::storage::{allocate_session, record_session_files};
use crate::orchestrator::topology::{build_topology, plan_topology, Topology, TopologyPlan};
use crate::pipeline::PipelineResource;
use crate::templates::{timestamp_now, PathTemplate};
use crate::{AppError, Result};

/// Shortest accepted video snapshot, in seconds.
pub const MIN_VIDEO_SNAPSHOT_SECS: u64 = 5;

/// Longest accepted video snapshot, in seconds.
pub const MAX_VIDEO_SNAPSHOT_SECS: u64 = 3600;

/// Camera name substituted into video snapshot templates, which cover
/// every camera at once.
pub const ALL_CAMERAS: &str = "all";

/// Name used for the configuration copy when the source has no file name.
const FALLBACK_CONFIG_NAME: &str = "session.cfg";

/// Session configuration text and the file name it is copied under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    /// File name of the verbatim copy inside the session directory.
    pub name: String,
    /// Raw configuration text.
    pub text: String,
}

impl ConfigSource {
    /// Read configuration from `path`, keeping its file name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("cannot read {}: {err}", path.display())))?;
        let name = path
            .file_name()
            .map_or_else(|| FALLBACK_CONFIG_NAME.to_owned(), |n| n.to_string_lossy().into_owned());
        Ok(Self { name, text })
    }

    /// Wrap in-memory text under the fallback file name.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            name: FALLBACK_CONFIG_NAME.to_owned(),
            text: text.into(),
        }
    }
}

/// Which cameras an image trigger covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSelector {
    /// Every configured camera, in declaration order.
    All,
    /// The named cameras, in the given order.
    Named(Vec<String>),
}

impl CameraSelector {
    /// Parse `all` or a comma-separated list of camera names.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case(ALL_CAMERAS) {
            return Self::All;
        }
        Self::Named(
            text.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }
}

/// Pick the daemon control implied by `config`: supervised when managed,
/// external otherwise.
///
/// # Errors
///
/// Returns `AppError::Config` if the supervisor rejects the settings.
pub fn default_daemon(session: &Session, config: &DaemonConfig) -> Result<Box<dyn DaemonControl>> {
    if config.manage {
        Ok(Box::new(DaemonSupervisor::new(config, &session.logs_directory)?))
    } else {
        Ok(Box::new(ExternalDaemon))
    }
}

/// Owner of one ingest session.
pub struct Orchestrator {
    session: Session,
    config: SessionConfig,
    settings: Settings,
    plan: TopologyPlan,
    daemon: Box<dyn DaemonControl>,
    topology: Topology,
    state: SessionState,
    image_lock: SharedCaptureLock,
    video_lock: SharedCaptureLock,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session", &self.session.number)
            .field("state", &self.state)
            .field("pipelines", &self.topology.names())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Allocate a session under `root`, start the daemon chosen by the
    /// settings, connect and build the topology.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::start_with`].
    pub async fn start(
        root: &Path,
        source: ConfigSource,
        settings: Settings,
        connector: &dyn Connector,
    ) -> Result<Self> {
        Self::start_with(root, source, settings, connector, default_daemon).await
    }

    /// Like [`Orchestrator::start`], with the daemon control produced by
    /// `daemon` once the session's log directory exists.
    ///
    /// # Errors
    ///
    /// - `AppError::Config` for unparsable configuration, before anything
    ///   is allocated.
    /// - `AppError::Storage` if the session directory cannot be created.
    /// - The camera and recording template variants from planning, before
    ///   the daemon is started.
    /// - `AppError::Daemon` / `AppError::DaemonUnreachable` if the daemon
    ///   cannot be started or contacted.
    /// - `AppError::DaemonCommand` if topology construction fails; every
    ///   pipeline created so far is torn down first.
    pub async fn start_with<F>(
        root: &Path,
        source: ConfigSource,
        settings: Settings,
        connector: &dyn Connector,
        daemon: F,
    ) -> Result<Self>
    where
        F: FnOnce(&Session, &DaemonConfig) -> Result<Box<dyn DaemonControl>>,
    {
        let config = SessionConfig::from_text(&source.text)?;

        let session = allocate_session(root)?;
        let span = info_span!("session", session = session.number);
        async move {
            record_session_files(&session, &source.name, &source.text)?;
            let plan = plan_topology(&config, &settings, &session.directory)?;

            let daemon = daemon(&session, &settings.daemon)?;
            if let Err(err) = daemon.start().await {
                error!(%err, "daemon start failed");
                stop_daemon(daemon.as_ref()).await;
                return Err(err);
            }

            let endpoint = Endpoint::new(settings.daemon.address.clone(), settings.daemon.port);
            let client = match ControlClient::connect(
                connector,
                &endpoint,
                settings.connection.retries,
                settings.retry_delay(),
            )
            .await
            {
                Ok(client) => client,
                Err(err) => {
                    error!(%err, "daemon unreachable");
                    stop_daemon(daemon.as_ref()).await;
                    return Err(err);
                }
            };

            let serialize = settings.capture.serialize_shared_captures;
            let mut orchestrator = Self {
                session,
                config,
                settings,
                plan,
                daemon,
                topology: Topology::default(),
                state: SessionState::Initializing,
                image_lock: serialize.then(|| Arc::new(Mutex::new(()))),
                video_lock: serialize.then(|| Arc::new(Mutex::new(()))),
            };

            if let Err(err) = build_topology(&client, &orchestrator.plan, &mut orchestrator.topology).await {
                error!(%err, "topology construction failed; tearing session down");
                orchestrator.stop_all().await;
                orchestrator.deconstruct_all().await;
                return Err(err);
            }

            orchestrator.transition(SessionState::TopologyBuilt)?;
            info!(
                directory = %orchestrator.session.directory.display(),
                pipelines = orchestrator.topology.len(),
                "session ready"
            );
            Ok(orchestrator)
        }
        .instrument(span)
        .await
    }

    /// The allocated session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Live pipeline handles.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The plan the topology was built from.
    #[must_use]
    pub fn plan(&self) -> &TopologyPlan {
        &self.plan
    }

    /// Typed session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Play every camera, then wait for the configured settle interval.
    ///
    /// A camera that fails to play is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` unless the topology is built.
    pub async fn start_cameras(&mut self) -> Result<()> {
        self.require(&[SessionState::TopologyBuilt, SessionState::Running])?;
        let played = play_group(self.topology.group(PipelineGroup::Camera)).await;
        info!(played, "cameras started; settling");
        tokio::time::sleep(self.settings.timings.camera_settle()).await;
        self.transition(SessionState::Running)
    }

    /// Play every historical buffer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` unless the session is running.
    pub async fn start_buffers(&self) -> Result<()> {
        self.require(&[SessionState::Running])?;
        let played = play_group(self.topology.group(PipelineGroup::Buffer)).await;
        info!(played, "buffers started");
        Ok(())
    }

    /// Play the recording pipeline.
    ///
    /// Returns the per-camera segment locations, or `None` when recording
    /// is disabled, the session is not running, or the daemon refused.
    pub async fn start_persistent_recording(&self) -> Option<Vec<PathBuf>> {
        if let Err(err) = self.require(&[SessionState::Running]) {
            warn!(%err, "cannot start recording");
            return None;
        }
        let Some(recording) = self.topology.recording() else {
            warn!("persistent recording is not enabled");
            return None;
        };
        match recording.play().await {
            Ok(()) => {
                let locations: Vec<PathBuf> = self
                    .topology
                    .recording_outputs()
                    .iter()
                    .map(|output| output.location.clone())
                    .collect();
                info!(outputs = locations.len(), "persistent recording started");
                Some(locations)
            }
            Err(err) => {
                warn!(%err, "persistent recording failed to start");
                None
            }
        }
    }

    /// Drain and stop the recording pipeline. Failures are logged.
    pub async fn stop_persistent_recording(&self) {
        let Some(recording) = self.topology.recording() else {
            return;
        };
        let span = info_span!("stop_recording", pipeline = recording.name());
        async {
            if recording.state().await.accepts_end_of_stream() {
                if let Err(err) = recording.send_end_of_stream().await {
                    warn!(%err, "end-of-stream to recording failed");
                }
                tokio::time::sleep(self.settings.timings.drain()).await;
            }
            if recording.state().await.is_running() {
                if let Err(err) = recording.stop().await {
                    warn!(%err, "stopping recording failed");
                }
            }
            info!("persistent recording stopped");
        }
        .instrument(span)
        .await;
    }

    /// Capture one still per selected camera on a background task.
    ///
    /// `location` overrides the configured template. The handle resolves
    /// to the cameras for which a file was written.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTrigger` for a disabled feature, an
    /// unknown or empty camera selection, or a multi-camera request whose
    /// template lacks the camera placeholder; `AppError::InvalidState` if
    /// the session is not running. No daemon command is sent in either case.
    pub fn take_image_snapshot(
        &self,
        selector: &CameraSelector,
        location: Option<&str>,
    ) -> Result<JoinHandle<Vec<String>>> {
        self.require(&[SessionState::Running])?;
        let (Some(feature), Some(transcoder), Some(snapshot)) = (
            self.config.image_snapshot.as_ref(),
            self.topology.transcoder(),
            self.topology.image_snapshot(),
        ) else {
            return Err(AppError::InvalidTrigger(
                "image snapshots are not enabled".into(),
            ));
        };

        let cameras = self.select_cameras(selector)?;
        let template = PathTemplate::new(location.unwrap_or(&feature.location));
        if cameras.len() > 1 && !template.has_camera_placeholder() {
            return Err(AppError::InvalidTrigger(format!(
                "image location '{}' needs {{camera}} when capturing {} cameras",
                location.unwrap_or(&feature.location),
                cameras.len()
            )));
        }

        let targets = ImageTargets {
            cameras,
            template,
            base: self.session.directory.clone(),
            timestamp: timestamp_now(),
        };
        let worker = ImageCapture {
            transcoder: Arc::clone(transcoder),
            snapshot: Arc::clone(snapshot),
            timings: self.settings.timings.clone(),
            lock: self.image_lock.clone(),
        };
        info!(cameras = ?targets.cameras, "image snapshot triggered");
        Ok(tokio::spawn(worker.run(targets)))
    }

    /// Capture buffered video from every camera on a background task.
    ///
    /// `duration_secs` and `location` override the configured defaults.
    /// The handle resolves to the written path or the failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTrigger` for a disabled feature or a
    /// duration outside 5..=3600 seconds; `AppError::InvalidState` if the
    /// session is not running.
    pub fn take_video_snapshot(
        &self,
        duration_secs: Option<u64>,
        location: Option<&str>,
    ) -> Result<JoinHandle<Result<PathBuf>>> {
        self.require(&[SessionState::Running])?;
        let (Some(feature), Some(snapshot)) = (
            self.config.video_snapshot.as_ref(),
            self.topology.video_snapshot(),
        ) else {
            return Err(AppError::InvalidTrigger(
                "video snapshots are not enabled".into(),
            ));
        };

        let duration_secs = duration_secs.unwrap_or(feature.duration_secs);
        validate_video_duration(duration_secs)?;

        let path = PathTemplate::new(location.unwrap_or(&feature.location)).resolve(
            &self.session.directory,
            ALL_CAMERAS,
            &timestamp_now(),
        );
        let worker = VideoCapture {
            snapshot: Arc::clone(snapshot),
            timings: self.settings.timings.clone(),
            lock: self.video_lock.clone(),
        };
        info!(duration_secs, location = %path.display(), "video snapshot triggered");
        Ok(tokio::spawn(
            worker.run(Duration::from_secs(duration_secs), path),
        ))
    }

    /// Drain the recording and transcoder, then stop every pipeline
    /// downstream-first. Failures are logged.
    pub async fn stop_all(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }
        self.state = SessionState::Draining;
        let span = info_span!("stop_all", session = self.session.number);
        async {
            let mut drained = false;
            let draining = self
                .topology
                .group(PipelineGroup::Recorder)
                .iter()
                .chain(self.topology.group(PipelineGroup::VideoEncoder));
            for resource in draining {
                if resource.state().await.accepts_end_of_stream() {
                    match resource.send_end_of_stream().await {
                        Ok(()) => drained = true,
                        Err(err) => warn!(pipeline = resource.name(), %err, "end-of-stream failed"),
                    }
                }
            }
            if drained {
                tokio::time::sleep(self.settings.timings.drain()).await;
            }

            for group in PipelineGroup::STOP_ORDER {
                for resource in self.topology.group(group) {
                    stop_resource(resource).await;
                }
            }
            info!("all pipelines stopped");
        }
        .instrument(span)
        .await;
    }

    /// Delete every pipeline, then stop the daemon. Failures are logged;
    /// calling it again is a no-op.
    pub async fn deconstruct_all(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }
        let span = info_span!("deconstruct_all", session = self.session.number);
        async {
            for resource in self.topology.drain_all() {
                if let Err(err) = resource.delete().await {
                    warn!(pipeline = resource.name(), %err, "pipeline delete failed");
                }
            }
            stop_daemon(self.daemon.as_ref()).await;
        }
        .instrument(span)
        .await;
        self.state = SessionState::TornDown;
        info!(session = self.session.number, "session torn down");
    }

    /// Ordered shutdown: stop recording, stop everything, delete everything.
    pub async fn shutdown(&mut self) {
        self.stop_persistent_recording().await;
        self.stop_all().await;
        self.deconstruct_all().await;
    }

    fn select_cameras(&self, selector: &CameraSelector) -> Result<Vec<String>> {
        let cameras = match selector {
            CameraSelector::All => self.config.camera_names(),
            CameraSelector::Named(names) => {
                if let Some(unknown) = names.iter().find(|n| self.config.camera(n).is_none()) {
                    return Err(AppError::InvalidTrigger(format!(
                        "unknown camera '{unknown}'"
                    )));
                }
                names.clone()
            }
        };
        if cameras.is_empty() {
            return Err(AppError::InvalidTrigger("no camera selected".into()));
        }
        Ok(cameras)
    }

    fn require(&self, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "operation not allowed while session is {:?}",
                self.state
            )))
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "cannot move session from {:?} to {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// Reject video snapshot durations outside 5..=3600 seconds.
///
/// # Errors
///
/// Returns `AppError::InvalidTrigger` when out of range.
pub fn validate_video_duration(duration_secs: u64) -> Result<()> {
    if (MIN_VIDEO_SNAPSHOT_SECS..=MAX_VIDEO_SNAPSHOT_SECS).contains(&duration_secs) {
        Ok(())
    } else {
        Err(AppError::InvalidTrigger(format!(
            "video snapshot duration {duration_secs}s outside \
             {MIN_VIDEO_SNAPSHOT_SECS}..={MAX_VIDEO_SNAPSHOT_SECS}s"
        )))
    }
}

async fn play_group(resources: &[Arc<PipelineResource>]) -> usize {
    let mut played = 0;
    for resource in resources {
        match resource.play().await {
            Ok(()) => played += 1,
            Err(err) => warn!(pipeline = resource.name(), %err, "pipeline failed to play"),
        }
    }
    played
}

async fn stop_resource(resource: &PipelineResource) {
    let state = resource.state().await;
    if !state.is_live() || state == LifecycleState::Stopped {
        return;
    }
    if let Err(err) = resource.stop().await {
        warn!(pipeline = resource.name(), %err, "pipeline stop failed");
    }
}

async fn stop_daemon(daemon: &dyn DaemonControl) {
    if let Err(err) = daemon.stop().await {
        warn!(%err, "daemon stop failed");
    }
}
