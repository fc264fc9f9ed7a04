//! Topology planning and construction.
//!
//! [`plan_topology`] is pure: it validates the typed configuration and
//! produces every pipeline name, descriptor and initial property in
//! creation order. [`build_topology`] then replays the plan against the
//! daemon, inserting each pipeline into the [`Topology`] as soon as it
//! exists so a failed build can still be torn down completely.
//!
//! Pipelines are wired through inter-pipeline sinks and sources: every
//! camera publishes a sink named after itself, buffers publish
//! `buffer_{camera}`, and the shared transcoder publishes
//! `encode_jpeg_sink`. A pipeline may reference another pipeline's sink
//! name as soon as that name is fixed; nothing has to be playing yet.

use std::collections::HashSet;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::config::Settings;
use crate::control::ControlClient;
use crate::models::config::{CameraConfig, RecordingConfig, SessionConfig, VideoSnapshotConfig};
use crate::models::pipeline::PipelineGroup;
use crate::pipeline::{file_sink_name, PipelineResource, LOCATION_PROPERTY};
use crate::templates::{timestamp_now, PathTemplate};
use crate::{AppError, Result};

/// Shared single-frame transcoder pipeline.
pub const TRANSCODER_NAME: &str = "encode_jpeg";
/// Source element of the transcoder, rebound per trigger.
pub const TRANSCODER_SOURCE: &str = "encode_jpeg_src";
/// Sink published by the transcoder.
pub const TRANSCODER_SINK: &str = "encode_jpeg_sink";
/// Single-frame image snapshot pipeline.
pub const IMAGE_SNAPSHOT_NAME: &str = "snap_jpeg";
/// Buffered video snapshot pipeline.
pub const VIDEO_SNAPSHOT_NAME: &str = "snap_video";
/// Multi-branch persistent recording pipeline.
pub const RECORDING_NAME: &str = "record_h264";

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Historical buffer pipeline for `camera`.
#[must_use]
pub fn buffer_pipeline_name(camera: &str) -> String {
    format!("buffer_h264_{camera}")
}

/// Sink published by the historical buffer for `camera`.
#[must_use]
pub fn buffer_sink_name(camera: &str) -> String {
    format!("buffer_{camera}")
}

/// FIFO queue element inside the buffer for `camera`.
#[must_use]
pub fn buffer_queue_name(camera: &str) -> String {
    format!("fifo_queue_{camera}")
}

/// Recording branch sink for `camera`.
#[must_use]
pub fn recording_branch_name(camera: &str) -> String {
    format!("multisink_{camera}")
}

/// A property set right after a pipeline is created.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PropertyAssignment {
    /// Element inside the pipeline.
    pub element: String,
    /// Property key.
    pub property: String,
    /// Rendered value.
    pub value: String,
}

impl PropertyAssignment {
    fn new(element: impl Into<String>, property: &str, value: &impl Display) -> Self {
        Self {
            element: element.into(),
            property: property.to_owned(),
            value: value.to_string(),
        }
    }
}

/// One pipeline the plan will create.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedPipeline {
    /// Unique pipeline name.
    pub name: String,
    /// Owning collection.
    pub group: PipelineGroup,
    /// Declarative descriptor sent on create.
    pub descriptor: String,
    /// Properties applied after create, in order.
    pub properties: Vec<PropertyAssignment>,
}

/// Resolved persistent recording output for one camera.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordingOutput {
    /// Camera name.
    pub camera: String,
    /// Directory pre-created before the recording pipeline.
    pub directory: PathBuf,
    /// Segment location, still carrying the segment placeholder.
    pub location: PathBuf,
}

/// Computed historical buffer limits.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BufferSizing {
    /// Minimum retained time.
    pub min_time_ns: u64,
    /// Time at which the oldest data starts being dropped (105 % of minimum).
    pub overflow_time_ns: u64,
    /// Byte cap applied to each buffer queue.
    pub overflow_bytes: u64,
}

impl BufferSizing {
    /// Derive limits from the video snapshot configuration and stream
    /// assumptions. An explicit `buffer_max_bytes` replaces the computed cap.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn compute(video: &VideoSnapshotConfig, settings: &Settings) -> Self {
        let min_time_ns = video.buffer_time_secs.saturating_mul(NANOS_PER_SECOND);
        let overflow_time_ns = min_time_ns.saturating_mul(105) / 100;
        let computed_bytes = (overflow_time_ns as f64 / NANOS_PER_SECOND as f64
            * settings.stream.assumed_bitrate_mbps
            * settings.stream.buffer_safety_multiple
            * BYTES_PER_MEGABYTE) as u64;
        Self {
            min_time_ns,
            overflow_time_ns,
            overflow_bytes: video.buffer_max_bytes.unwrap_or(computed_bytes),
        }
    }
}

/// Every pipeline of a session, in creation order.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TopologyPlan {
    /// Pipelines in creation order.
    pub pipelines: Vec<PlannedPipeline>,
    /// Recording outputs, one per camera, when recording is enabled.
    pub recording_outputs: Vec<RecordingOutput>,
    /// Buffer limits, when video snapshots are enabled.
    pub buffer_sizing: Option<BufferSizing>,
}

/// Validate `config` and plan the session topology rooted at `session_dir`.
///
/// # Errors
///
/// - `AppError::Config` when no camera is configured.
/// - `AppError::InvalidCameraConfig` / `AppError::DuplicateCameraName`
///   for bad camera entries.
/// - `AppError::InvalidRecordingTemplate` / `AppError::MissingCameraPlaceholder`
///   for a recording location lacking its placeholders.
pub fn plan_topology(
    config: &SessionConfig,
    settings: &Settings,
    session_dir: &Path,
) -> Result<TopologyPlan> {
    validate_cameras(&config.cameras)?;
    let mut plan = TopologyPlan::default();

    for camera in &config.cameras {
        plan.pipelines.push(camera_pipeline(camera));
    }

    if let Some(recording) = &config.recording {
        let outputs = plan_recording_outputs(recording, &config.cameras, session_dir)?;
        plan.pipelines
            .push(recording_pipeline(recording, &outputs, settings));
        plan.recording_outputs = outputs;
    }

    if let Some(video) = &config.video_snapshot {
        let sizing = BufferSizing::compute(video, settings);
        for camera in &config.cameras {
            plan.pipelines.push(buffer_pipeline(&camera.name, &sizing));
        }
        plan.pipelines.push(video_snapshot_pipeline(&config.cameras));
        plan.buffer_sizing = Some(sizing);
    }

    if config.image_snapshot.is_some() {
        let first = &config.cameras[0].name;
        plan.pipelines.push(transcoder_pipeline(first));
        plan.pipelines.push(image_snapshot_pipeline());
    }

    Ok(plan)
}

fn validate_cameras(cameras: &[CameraConfig]) -> Result<()> {
    if cameras.is_empty() {
        return Err(AppError::Config(
            "at least one enabled camera is required".into(),
        ));
    }
    let mut seen = HashSet::new();
    for camera in cameras {
        let fields = [
            ("name", &camera.name),
            ("address", &camera.address),
            ("username", &camera.username),
            ("password", &camera.password),
        ];
        if let Some((key, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AppError::InvalidCameraConfig(format!(
                "camera '{}' is missing '{key}'",
                camera.name
            )));
        }
        if !seen.insert(camera.name.as_str()) {
            return Err(AppError::DuplicateCameraName(camera.name.clone()));
        }
    }
    Ok(())
}

/// Resolve and validate the per-camera recording outputs.
///
/// # Errors
///
/// Returns `AppError::InvalidRecordingTemplate` when the filename portion
/// has no segment placeholder and `AppError::MissingCameraPlaceholder`
/// when neither portion names the camera.
pub fn plan_recording_outputs(
    recording: &RecordingConfig,
    cameras: &[CameraConfig],
    session_dir: &Path,
) -> Result<Vec<RecordingOutput>> {
    let template = PathTemplate::new(&recording.location);
    if !template.filename_has_segment() {
        return Err(AppError::InvalidRecordingTemplate(format!(
            "'{}' needs a segment number placeholder such as %05d in its filename",
            recording.location
        )));
    }
    if !template.has_camera_placeholder() {
        return Err(AppError::MissingCameraPlaceholder(format!(
            "'{}' needs {{camera}} in its directory or filename",
            recording.location
        )));
    }

    let timestamp = timestamp_now();
    Ok(cameras
        .iter()
        .map(|camera| RecordingOutput {
            camera: camera.name.clone(),
            directory: template.resolve_directory(session_dir, &camera.name, &timestamp),
            location: template.resolve(session_dir, &camera.name, &timestamp),
        })
        .collect())
}

fn camera_pipeline(camera: &CameraConfig) -> PlannedPipeline {
    PlannedPipeline {
        name: camera.name.clone(),
        group: PipelineGroup::Camera,
        descriptor: format!(
            "rtspsrc location={} ! rtph264depay ! h264parse ! queue ! \
             interpipesink name={} forward-events=true forward-eos=true sync=false",
            camera.source_uri(),
            camera.name
        ),
        properties: Vec::new(),
    }
}

fn recording_pipeline(
    recording: &RecordingConfig,
    outputs: &[RecordingOutput],
    settings: &Settings,
) -> PlannedPipeline {
    let descriptor = outputs
        .iter()
        .map(|output| {
            format!(
                "interpipesrc format=time allow-renegotiation=false listen-to={} ! \
                 splitmuxsink name={} async-finalize=true muxer-pad-map=x-pad-map,video=video_0",
                output.camera,
                recording_branch_name(&output.camera)
            )
        })
        .collect::<Vec<_>>()
        .join(" ");

    let segment_ns = recording.segment_duration_ns();
    let retention = recording.retention_files(settings.stream.assumed_bitrate_mbps);
    let mut properties = Vec::new();
    for output in outputs {
        let branch = recording_branch_name(&output.camera);
        properties.push(PropertyAssignment::new(&branch, "max-size-time", &segment_ns));
        properties.push(PropertyAssignment::new(
            &branch,
            LOCATION_PROPERTY,
            &output.location.display(),
        ));
        if retention > 0 {
            properties.push(PropertyAssignment::new(&branch, "max-files", &retention));
        }
    }

    PlannedPipeline {
        name: RECORDING_NAME.to_owned(),
        group: PipelineGroup::Recorder,
        descriptor,
        properties,
    }
}

fn buffer_pipeline(camera: &str, sizing: &BufferSizing) -> PlannedPipeline {
    let queue = buffer_queue_name(camera);
    PlannedPipeline {
        name: buffer_pipeline_name(camera),
        group: PipelineGroup::Buffer,
        // leaky=2 drops the oldest data instead of blocking upstream.
        descriptor: format!(
            "interpipesrc format=time listen-to={camera} ! queue name={queue} \
             max-size-buffers=0 max-size-bytes={} leaky=2 silent=true flush-on-eos=false ! \
             interpipesink name={} forward-events=true forward-eos=true sync=false",
            sizing.overflow_bytes,
            buffer_sink_name(camera)
        ),
        properties: vec![
            PropertyAssignment::new(&queue, "min-threshold-time", &sizing.min_time_ns),
            PropertyAssignment::new(&queue, "max-size-time", &sizing.overflow_time_ns),
        ],
    }
}

fn video_snapshot_pipeline(cameras: &[CameraConfig]) -> PlannedPipeline {
    let mut branches: Vec<String> = cameras
        .iter()
        .enumerate()
        .map(|(index, camera)| {
            format!(
                "interpipesrc format=time allow-renegotiation=false listen-to={} ! snapmux.video_{index}",
                buffer_sink_name(&camera.name)
            )
        })
        .collect();
    branches.push(format!(
        "mp4mux name=snapmux ! filesink name={}",
        file_sink_name(VIDEO_SNAPSHOT_NAME)
    ));

    PlannedPipeline {
        name: VIDEO_SNAPSHOT_NAME.to_owned(),
        group: PipelineGroup::Snapshot,
        descriptor: branches.join(" "),
        properties: Vec::new(),
    }
}

fn transcoder_pipeline(first_camera: &str) -> PlannedPipeline {
    PlannedPipeline {
        name: TRANSCODER_NAME.to_owned(),
        group: PipelineGroup::VideoEncoder,
        descriptor: format!(
            "interpipesrc name={TRANSCODER_SOURCE} format=time listen-to={first_camera} ! \
             avdec_h264 ! jpegenc ! interpipesink name={TRANSCODER_SINK} forward-events=true \
             forward-eos=true sync=false async=false enable-last-sample=false drop=true"
        ),
        properties: Vec::new(),
    }
}

fn image_snapshot_pipeline() -> PlannedPipeline {
    PlannedPipeline {
        name: IMAGE_SNAPSHOT_NAME.to_owned(),
        group: PipelineGroup::Snapshot,
        descriptor: format!(
            "interpipesrc name={IMAGE_SNAPSHOT_NAME}_src format=time listen-to={TRANSCODER_SINK} \
             num-buffers=1 ! filesink name={}",
            file_sink_name(IMAGE_SNAPSHOT_NAME)
        ),
        properties: Vec::new(),
    }
}

/// Live pipeline handles owned by the orchestrator, one collection per
/// [`PipelineGroup`].
#[derive(Debug, Default)]
pub struct Topology {
    cameras: Vec<Arc<PipelineResource>>,
    video_encoders: Vec<Arc<PipelineResource>>,
    buffers: Vec<Arc<PipelineResource>>,
    recorders: Vec<Arc<PipelineResource>>,
    snapshots: Vec<Arc<PipelineResource>>,
    recording_outputs: Vec<RecordingOutput>,
}

impl Topology {
    /// Pipelines owned by `group`, in creation order.
    #[must_use]
    pub fn group(&self, group: PipelineGroup) -> &[Arc<PipelineResource>] {
        match group {
            PipelineGroup::Camera => &self.cameras,
            PipelineGroup::VideoEncoder => &self.video_encoders,
            PipelineGroup::Buffer => &self.buffers,
            PipelineGroup::Recorder => &self.recorders,
            PipelineGroup::Snapshot => &self.snapshots,
        }
    }

    fn group_mut(&mut self, group: PipelineGroup) -> &mut Vec<Arc<PipelineResource>> {
        match group {
            PipelineGroup::Camera => &mut self.cameras,
            PipelineGroup::VideoEncoder => &mut self.video_encoders,
            PipelineGroup::Buffer => &mut self.buffers,
            PipelineGroup::Recorder => &mut self.recorders,
            PipelineGroup::Snapshot => &mut self.snapshots,
        }
    }

    /// Add a pipeline to the collection matching its group.
    pub fn insert(&mut self, resource: Arc<PipelineResource>) {
        self.group_mut(resource.group()).push(resource);
    }

    /// Shared transcoder, when image snapshots are enabled.
    #[must_use]
    pub fn transcoder(&self) -> Option<&Arc<PipelineResource>> {
        self.video_encoders.iter().find(|r| r.name() == TRANSCODER_NAME)
    }

    /// Image snapshot pipeline, when enabled.
    #[must_use]
    pub fn image_snapshot(&self) -> Option<&Arc<PipelineResource>> {
        self.snapshots.iter().find(|r| r.name() == IMAGE_SNAPSHOT_NAME)
    }

    /// Video snapshot pipeline, when enabled.
    #[must_use]
    pub fn video_snapshot(&self) -> Option<&Arc<PipelineResource>> {
        self.snapshots.iter().find(|r| r.name() == VIDEO_SNAPSHOT_NAME)
    }

    /// Persistent recording pipeline, when enabled.
    #[must_use]
    pub fn recording(&self) -> Option<&Arc<PipelineResource>> {
        self.recorders.first()
    }

    /// Resolved per-camera recording outputs.
    #[must_use]
    pub fn recording_outputs(&self) -> &[RecordingOutput] {
        &self.recording_outputs
    }

    /// Total number of referencable pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        PipelineGroup::STOP_ORDER
            .iter()
            .map(|group| self.group(*group).len())
            .sum()
    }

    /// Whether no pipeline is referencable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All pipeline names, downstream groups first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        PipelineGroup::STOP_ORDER
            .iter()
            .flat_map(|group| self.group(*group))
            .map(|resource| resource.name().to_owned())
            .collect()
    }

    /// Remove every pipeline, downstream groups first.
    pub fn drain_all(&mut self) -> Vec<Arc<PipelineResource>> {
        let mut drained = Vec::with_capacity(self.len());
        for group in PipelineGroup::STOP_ORDER {
            drained.append(self.group_mut(group));
        }
        self.recording_outputs.clear();
        drained
    }
}

/// Create every planned pipeline on the daemon.
///
/// Recording directories are created just before the recording pipeline.
/// Each pipeline is inserted into `topology` the moment the daemon holds
/// it, so on error the caller can tear down exactly what exists.
///
/// # Errors
///
/// Returns `AppError::Storage` if a recording directory cannot be
/// created, or `AppError::DaemonCommand` for the first rejected command.
pub async fn build_topology(
    client: &ControlClient,
    plan: &TopologyPlan,
    topology: &mut Topology,
) -> Result<()> {
    for planned in &plan.pipelines {
        let span = info_span!("build_pipeline", pipeline = %planned.name, group = ?planned.group);
        async {
            if planned.group == PipelineGroup::Recorder {
                create_recording_directories(&plan.recording_outputs)?;
            }
            let resource = PipelineResource::create(
                client.clone(),
                planned.name.clone(),
                planned.descriptor.clone(),
                planned.group,
            )
            .await?;
            topology.insert(Arc::clone(&resource));

            for property in &planned.properties {
                resource
                    .set_property(&property.element, &property.property, &property.value)
                    .await?;
            }
            Ok::<(), AppError>(())
        }
        .instrument(span)
        .await?;
    }

    topology.recording_outputs.clone_from(&plan.recording_outputs);
    info!(pipelines = topology.len(), "topology built");
    Ok(())
}

fn create_recording_directories(outputs: &[RecordingOutput]) -> Result<()> {
    for output in outputs {
        fs::create_dir_all(&output.directory).map_err(|err| {
            AppError::Storage(format!(
                "cannot create recording directory {} for {}: {err}",
                output.directory.display(),
                output.camera
            ))
        })?;
        info!(camera = %output.camera, directory = %output.directory.display(), "recording directory ready");
    }
    Ok(())
}
