//! Triggered capture workers.
//!
//! Workers only play, stop, rebind and set properties on pipelines the
//! orchestrator already owns; they never create or delete anything.
//! Each worker runs to completion on its own task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::config::TimingConfig;
use crate::orchestrator::topology::TRANSCODER_SOURCE;
use crate::pipeline::PipelineResource;
use crate::templates::PathTemplate;
use crate::{AppError, Result};

/// Optional lock serializing triggers that share one pipeline.
pub type SharedCaptureLock = Option<Arc<Mutex<()>>>;

/// Image capture over the shared transcoder and snapshot pipelines.
#[derive(Debug, Clone)]
pub struct ImageCapture {
    /// Shared single-frame transcoder.
    pub transcoder: Arc<PipelineResource>,
    /// Single-frame file writer.
    pub snapshot: Arc<PipelineResource>,
    /// Spin-up and execute intervals.
    pub timings: TimingConfig,
    /// Serialization lock, when enabled.
    pub lock: SharedCaptureLock,
}

/// Resolved outputs of one image trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTargets {
    /// Cameras in capture order.
    pub cameras: Vec<String>,
    /// Location template, relative parts resolved against `base`.
    pub template: PathTemplate,
    /// Session directory.
    pub base: PathBuf,
    /// Trigger timestamp substituted for the timestamp placeholder.
    pub timestamp: String,
}

impl ImageTargets {
    /// Output file for `camera`.
    #[must_use]
    pub fn location(&self, camera: &str) -> PathBuf {
        self.template.resolve(&self.base, camera, &self.timestamp)
    }
}

impl ImageCapture {
    /// Capture one still per camera, in order.
    ///
    /// Per-camera failures are logged and skipped. Returns the cameras for
    /// which a file was written.
    pub async fn run(self, targets: ImageTargets) -> Vec<String> {
        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut written = Vec::with_capacity(targets.cameras.len());
        for camera in &targets.cameras {
            let location = targets.location(camera);
            let span = info_span!("image_snapshot", camera = %camera);
            match self.capture_one(camera, &location).instrument(span).await {
                Ok(()) => {
                    info!(camera = %camera, location = %location.display(), "image snapshot written");
                    written.push(camera.clone());
                }
                Err(err) => {
                    warn!(camera = %camera, %err, "image snapshot failed; skipping camera");
                    stop_if_playing(&self.snapshot).await;
                    stop_if_playing(&self.transcoder).await;
                }
            }
        }
        written
    }

    async fn capture_one(&self, camera: &str, location: &Path) -> Result<()> {
        ensure_parent(location).await?;
        self.snapshot.set_file_location(location).await?;
        self.transcoder.rebind(TRANSCODER_SOURCE, camera).await?;

        self.transcoder.play().await?;
        // The decoder needs a key frame before it can emit a usable still.
        tokio::time::sleep(self.timings.transcoder_spinup()).await;
        self.snapshot.play().await?;
        tokio::time::sleep(self.timings.snapshot_execute()).await;

        self.snapshot.stop().await?;
        self.transcoder.stop().await?;
        Ok(())
    }
}

/// Video capture from the historical buffers.
#[derive(Debug, Clone)]
pub struct VideoCapture {
    /// Multi-input buffered snapshot pipeline.
    pub snapshot: Arc<PipelineResource>,
    /// Finalize interval.
    pub timings: TimingConfig,
    /// Serialization lock, when enabled.
    pub lock: SharedCaptureLock,
}

impl VideoCapture {
    /// Record `duration` past the trigger into `location`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the output directory cannot be
    /// created, or the first `AppError::DaemonCommand` that stopped the
    /// capture.
    pub async fn run(self, duration: Duration, location: PathBuf) -> Result<PathBuf> {
        let _guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let span = info_span!("video_snapshot", location = %location.display());
        let outcome = self.capture(duration, &location).instrument(span).await;
        match &outcome {
            Ok(()) => info!(location = %location.display(), "video snapshot written"),
            Err(err) => {
                warn!(location = %location.display(), %err, "video snapshot failed");
                stop_if_playing(&self.snapshot).await;
            }
        }
        outcome.map(|()| location)
    }

    async fn capture(&self, duration: Duration, location: &Path) -> Result<()> {
        ensure_parent(location).await?;
        self.snapshot.set_file_location(location).await?;
        self.snapshot.play().await?;
        tokio::time::sleep(duration).await;

        if let Err(err) = self.snapshot.send_end_of_stream().await {
            warn!(%err, "end-of-stream to video snapshot failed; stopping anyway");
        }
        tokio::time::sleep(self.timings.video_finalize()).await;
        self.snapshot.stop().await
    }
}

async fn ensure_parent(location: &Path) -> Result<()> {
    let Some(parent) = location.parent() else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent).await.map_err(|err| {
        AppError::Storage(format!("cannot create {}: {err}", parent.display()))
    })
}

async fn stop_if_playing(resource: &PipelineResource) {
    if resource.state().await.is_running() {
        if let Err(err) = resource.stop().await {
            warn!(pipeline = resource.name(), %err, "best-effort stop failed");
        }
    }
}
