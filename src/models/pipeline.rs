//! Pipeline lifecycle tags and ownership groups.

use serde::Serialize;

/// Locally tracked lifecycle state of a remote pipeline.
///
/// The daemon is authoritative. This tag records the last command that
/// succeeded and is only used to sequence further commands.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No create command has succeeded yet.
    Unconstructed,
    /// Created on the daemon, never played or stopped since.
    Created,
    /// Play command accepted.
    Playing,
    /// End-of-stream sent while playing; draining.
    EndOfStream,
    /// Stop command accepted.
    Stopped,
    /// Delete command accepted; terminal.
    Deleted,
}

impl LifecycleState {
    /// Whether an end-of-stream request makes sense in this state.
    #[must_use]
    pub fn accepts_end_of_stream(self) -> bool {
        self == Self::Playing
    }

    /// Whether the last accepted command left the pipeline running.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Playing | Self::EndOfStream)
    }

    /// Whether the resource still exists on the daemon as far as we know.
    #[must_use]
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Unconstructed | Self::Deleted)
    }
}

/// Orchestrator collection that owns a pipeline.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineGroup {
    /// Camera ingestion.
    Camera,
    /// Shared single-frame transcoder.
    VideoEncoder,
    /// Per-camera historical buffer.
    Buffer,
    /// Persistent multi-segment recording.
    Recorder,
    /// Image and video snapshot sinks.
    Snapshot,
}

impl PipelineGroup {
    /// Groups in the order they are stopped during shutdown.
    pub const STOP_ORDER: [Self; 5] = [
        Self::Snapshot,
        Self::Recorder,
        Self::VideoEncoder,
        Self::Buffer,
        Self::Camera,
    ];
}
