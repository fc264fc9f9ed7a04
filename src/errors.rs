//! Error types shared across the orchestrator.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all orchestration failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Malformed or ambiguous configuration text or settings.
    Config(String),
    /// A camera block is missing required address or credential fields.
    InvalidCameraConfig(String),
    /// Two camera blocks share the same name.
    DuplicateCameraName(String),
    /// Recording filename template lacks a segment-number placeholder.
    InvalidRecordingTemplate(String),
    /// Recording template lacks a camera-name placeholder in both the
    /// directory and the filename portion.
    MissingCameraPlaceholder(String),
    /// An output directory could not be created.
    Storage(String),
    /// Connection attempts to the media daemon were exhausted.
    DaemonUnreachable(String),
    /// A single lifecycle or property command was rejected by the daemon.
    DaemonCommand {
        /// Pipeline the command targeted.
        pipeline: String,
        /// Operation name (`create`, `play`, `stop`, ...).
        operation: String,
        /// Failure reported by the control channel.
        cause: String,
    },
    /// The daemon process could not be started or stopped.
    Daemon(String),
    /// A triggered capture was rejected before any daemon call.
    InvalidTrigger(String),
    /// The orchestrator is not in a state that permits the operation.
    InvalidState(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Build a [`AppError::DaemonCommand`] for `operation` on `pipeline`.
    pub fn daemon_command(
        pipeline: impl Into<String>,
        operation: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::DaemonCommand {
            pipeline: pipeline.into(),
            operation: operation.into(),
            cause: cause.into(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidCameraConfig(msg) => write!(f, "invalid camera config: {msg}"),
            Self::DuplicateCameraName(name) => write!(f, "duplicate camera name: {name}"),
            Self::InvalidRecordingTemplate(msg) => {
                write!(f, "invalid recording template: {msg}")
            }
            Self::MissingCameraPlaceholder(msg) => {
                write!(f, "missing camera placeholder: {msg}")
            }
            Self::Storage(msg) => write!(f, "storage unavailable: {msg}"),
            Self::DaemonUnreachable(msg) => write!(f, "daemon unreachable: {msg}"),
            Self::DaemonCommand {
                pipeline,
                operation,
                cause,
            } => write!(f, "daemon command {operation} on {pipeline} failed: {cause}"),
            Self::Daemon(msg) => write!(f, "daemon: {msg}"),
            Self::InvalidTrigger(msg) => write!(f, "invalid trigger: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid settings: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
