//! Operational settings parsing and validation.
//!
//! Settings cover everything that is not part of the per-session camera
//! configuration: how to launch and reach the media daemon, the fixed
//! settle/spin-up/drain intervals, stream bitrate assumptions, and the
//! capture concurrency policy. Every field has a default, so an empty
//! TOML document is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Media daemon process and control-channel address.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DaemonConfig {
    /// Daemon executable name or path.
    pub program: String,
    /// Control-channel TCP address.
    pub address: String,
    /// Control-channel TCP base port.
    pub port: u16,
    /// Daemon-internal debug verbosity, `0..=9`.
    pub debug_level: u8,
    /// Whether the orchestrator starts and stops the daemon itself.
    pub manage: bool,
    /// HTTP control protocol, enabled by a `[daemon.http]` table.
    pub http: Option<HttpProtocolConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            program: "gstd".into(),
            address: "127.0.0.1".into(),
            port: 5000,
            debug_level: 5,
            manage: true,
            http: None,
        }
    }
}

/// Daemon HTTP protocol listener.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct HttpProtocolConfig {
    /// Listen address.
    pub address: String,
    /// Listen port.
    pub port: u16,
}

impl Default for HttpProtocolConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: 5001,
        }
    }
}

/// Control-channel connection retry policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ConnectionConfig {
    /// Maximum connection attempts before giving up.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Fixed waits used in place of readiness signals from the daemon.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimingConfig {
    /// Wait after playing cameras before anything reads from them.
    pub camera_settle_ms: u64,
    /// Wait after playing the transcoder so a key frame can arrive.
    pub transcoder_spinup_ms: u64,
    /// Time the single-frame snapshot pipeline is left playing.
    pub snapshot_execute_ms: u64,
    /// Wait between end-of-stream and stop on drained pipelines.
    pub drain_ms: u64,
    /// Wait between end-of-stream and stop on the video snapshot.
    pub video_finalize_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            camera_settle_ms: 10_000,
            transcoder_spinup_ms: 3_000,
            snapshot_execute_ms: 2_000,
            drain_ms: 10_000,
            video_finalize_ms: 2_000,
        }
    }
}

impl TimingConfig {
    /// Camera settle interval.
    #[must_use]
    pub fn camera_settle(&self) -> Duration {
        Duration::from_millis(self.camera_settle_ms)
    }

    /// Transcoder spin-up interval.
    #[must_use]
    pub fn transcoder_spinup(&self) -> Duration {
        Duration::from_millis(self.transcoder_spinup_ms)
    }

    /// Snapshot execute interval.
    #[must_use]
    pub fn snapshot_execute(&self) -> Duration {
        Duration::from_millis(self.snapshot_execute_ms)
    }

    /// Drain interval.
    #[must_use]
    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    /// Video snapshot finalize interval.
    #[must_use]
    pub fn video_finalize(&self) -> Duration {
        Duration::from_millis(self.video_finalize_ms)
    }

    /// Settings with every wait set to zero.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            camera_settle_ms: 0,
            transcoder_spinup_ms: 0,
            snapshot_execute_ms: 0,
            drain_ms: 0,
            video_finalize_ms: 0,
        }
    }
}

/// Assumptions about camera streams used for storage sizing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct StreamConfig {
    /// Assumed per-camera bitrate in megabytes per second.
    pub assumed_bitrate_mbps: f64,
    /// Multiple of the assumed bitrate used to size buffer byte caps.
    pub buffer_safety_multiple: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            assumed_bitrate_mbps: 5.5,
            buffer_safety_multiple: 2.0,
        }
    }
}

/// Triggered-capture policy.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CaptureConfig {
    /// Hold a lock around the shared transcoder and video snapshot
    /// pipelines so concurrent triggers queue instead of interfering.
    pub serialize_shared_captures: bool,
}

/// Operational settings parsed from `settings.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct Settings {
    /// Daemon process and address.
    pub daemon: DaemonConfig,
    /// Connection retry policy.
    pub connection: ConnectionConfig,
    /// Fixed waits.
    pub timings: TimingConfig,
    /// Stream sizing assumptions.
    pub stream: StreamConfig,
    /// Capture policy.
    pub capture: CaptureConfig,
}

impl Settings {
    /// Load and validate settings from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read settings: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Self = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Delay between control-channel connection attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.connection.retry_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.daemon.debug_level > 9 {
            return Err(AppError::Config(
                "daemon.debug_level must be within 0..=9".into(),
            ));
        }
        if self.connection.retries == 0 {
            return Err(AppError::Config(
                "connection.retries must be greater than zero".into(),
            ));
        }
        if !positive(self.stream.assumed_bitrate_mbps) {
            return Err(AppError::Config(
                "stream.assumed_bitrate_mbps must be positive".into(),
            ));
        }
        if !positive(self.stream.buffer_safety_multiple) {
            return Err(AppError::Config(
                "stream.buffer_safety_multiple must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
