//! Strongly typed session configuration.
//!
//! Built once from [`ConfigBlocks`] so downstream components never
//! re-parse primitive values from strings.

use std::str::FromStr;

use tracing::warn;

use crate::config_file::{self, BlockKind, ConfigBlock, ConfigBlocks};
use crate::{AppError, Result};

/// Stream path appended to the camera address when none is configured.
pub const DEFAULT_STREAM_PATH: &str = "axis-media/media.amp";

/// Seconds of video retained by each historical buffer.
pub const DEFAULT_BUFFER_TIME_SECS: u64 = 30;

/// Default video snapshot duration in seconds.
pub const DEFAULT_VIDEO_SNAPSHOT_DURATION_SECS: u64 = 60;

/// Default persistent recording location template.
pub const DEFAULT_RECORDING_LOCATION: &str = "recording/record_{camera}_%05d.mp4";

/// Default recording segment duration in minutes.
pub const DEFAULT_SEGMENT_MINUTES: u64 = 15;

/// Default image snapshot location template.
pub const DEFAULT_IMAGE_LOCATION: &str = "snapshots/snap_{camera}_{timestamp}.jpeg";

/// Default video snapshot location template.
pub const DEFAULT_VIDEO_LOCATION: &str = "snapshots/video_{timestamp}.mp4";

const NANOS_PER_MINUTE: u64 = 60 * 1_000_000_000;

/// One physical camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// Unique camera name; also the name of its ingestion pipeline.
    pub name: String,
    /// Network address (host or host:port).
    pub address: String,
    /// Stream username.
    pub username: String,
    /// Stream password.
    pub password: String,
    /// Path component of the stream URI.
    pub stream_path: String,
}

impl CameraConfig {
    const KEYS: [&'static str; 5] = ["name", "address", "username", "password", "stream_path"];

    /// Build a camera from its block.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidCameraConfig` when `name`, `address`,
    /// `username` or `password` is absent or blank.
    pub fn from_block(block: &ConfigBlock) -> Result<Self> {
        warn_unknown_keys(BlockKind::Camera, block, &Self::KEYS);
        let name = required(block, "name", None)?;
        let address = required(block, "address", Some(&name))?;
        let username = required(block, "username", Some(&name))?;
        let password = required(block, "password", Some(&name))?;
        let stream_path = block
            .get("stream_path")
            .map_or(DEFAULT_STREAM_PATH, |p| p.trim_start_matches('/'))
            .to_owned();
        Ok(Self {
            name,
            address,
            username,
            password,
            stream_path,
        })
    }

    /// Source endpoint synthesized from credentials and address.
    #[must_use]
    pub fn source_uri(&self) -> String {
        format!(
            "rtsp://{}:{}@{}/{}",
            self.username, self.password, self.address, self.stream_path
        )
    }
}

fn required(block: &ConfigBlock, key: &str, camera: Option<&str>) -> Result<String> {
    match block.get(key).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_owned()),
        _ => Err(AppError::InvalidCameraConfig(match camera {
            Some(name) => format!("camera '{name}' is missing '{key}'"),
            None => format!("camera block is missing '{key}'"),
        })),
    }
}

/// Still image snapshot feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSnapshotConfig {
    /// Default output location template.
    pub location: String,
}

impl ImageSnapshotConfig {
    fn from_block(block: &ConfigBlock) -> Self {
        warn_unknown_keys(BlockKind::ImageSnapshot, block, &["location"]);
        Self {
            location: block
                .get("location")
                .unwrap_or(DEFAULT_IMAGE_LOCATION)
                .to_owned(),
        }
    }
}

/// Buffered video snapshot feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSnapshotConfig {
    /// Minimum retention of each historical buffer, in seconds.
    pub buffer_time_secs: u64,
    /// Default capture duration, in seconds.
    pub duration_secs: u64,
    /// Default output location template.
    pub location: String,
    /// Explicit buffer byte cap; computed from the bitrate when absent.
    pub buffer_max_bytes: Option<u64>,
}

impl VideoSnapshotConfig {
    const KEYS: [&'static str; 4] = ["buffer_time", "duration", "location", "buffer_max_bytes"];

    fn from_block(block: &ConfigBlock) -> Result<Self> {
        warn_unknown_keys(BlockKind::VideoSnapshot, block, &Self::KEYS);
        let buffer_time_secs = number(block, "buffer_time", DEFAULT_BUFFER_TIME_SECS)?;
        if buffer_time_secs == 0 {
            return Err(AppError::Config(
                "VIDEO_SNAPSHOT buffer_time must be greater than zero".into(),
            ));
        }
        Ok(Self {
            buffer_time_secs,
            duration_secs: number(block, "duration", DEFAULT_VIDEO_SNAPSHOT_DURATION_SECS)?,
            location: block
                .get("location")
                .unwrap_or(DEFAULT_VIDEO_LOCATION)
                .to_owned(),
            buffer_max_bytes: optional_number(block, "buffer_max_bytes")?,
        })
    }
}

/// Persistent multi-segment recording feature.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Output location template; needs segment and camera placeholders.
    pub location: String,
    /// Segment duration in minutes.
    pub segment_minutes: u64,
    /// Explicit per-camera segment file cap; 0 means unlimited.
    pub maximum_segment_files: u32,
    /// Per-camera storage budget in megabytes; overrides the file cap.
    pub maximum_camera_storage_mb: Option<f64>,
}

impl RecordingConfig {
    const KEYS: [&'static str; 4] = [
        "location",
        "segment_time",
        "maximum_segment_files",
        "maximum_camera_storage",
    ];

    fn from_block(block: &ConfigBlock) -> Result<Self> {
        warn_unknown_keys(BlockKind::Recording, block, &Self::KEYS);
        let segment_minutes = number(block, "segment_time", DEFAULT_SEGMENT_MINUTES)?;
        if segment_minutes == 0 {
            return Err(AppError::Config(
                "RECORDING segment_time must be greater than zero".into(),
            ));
        }
        let maximum_camera_storage_mb: Option<f64> =
            optional_number(block, "maximum_camera_storage")?;
        if maximum_camera_storage_mb.is_some_and(|mb| !mb.is_finite() || mb <= 0.0) {
            return Err(AppError::Config(
                "RECORDING maximum_camera_storage must be positive".into(),
            ));
        }
        Ok(Self {
            location: block
                .get("location")
                .unwrap_or(DEFAULT_RECORDING_LOCATION)
                .to_owned(),
            segment_minutes,
            maximum_segment_files: number(block, "maximum_segment_files", 0)?,
            maximum_camera_storage_mb,
        })
    }

    /// Segment duration in nanoseconds.
    #[must_use]
    pub fn segment_duration_ns(&self) -> u64 {
        self.segment_minutes.saturating_mul(NANOS_PER_MINUTE)
    }

    /// Number of segment files retained per camera; 0 means unlimited.
    ///
    /// A storage budget, when present, always overrides the explicit cap
    /// and is converted as `floor(storage_mb * 1024 / bitrate / 60 /
    /// segment_minutes)`. The result is then raised to at least 1: a budget
    /// smaller than one segment would otherwise floor to 0, which the
    /// recording sink reads as unlimited.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn retention_files(&self, assumed_bitrate_mbps: f64) -> u32 {
        match self.maximum_camera_storage_mb {
            Some(storage_mb) => {
                let files = (storage_mb * 1024.0
                    / assumed_bitrate_mbps
                    / 60.0
                    / self.segment_minutes as f64)
                    .floor();
                (files as u32).max(1)
            }
            None => self.maximum_segment_files,
        }
    }
}

/// Complete typed session configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    /// Enabled cameras in declaration order.
    pub cameras: Vec<CameraConfig>,
    /// Image snapshot feature, when enabled.
    pub image_snapshot: Option<ImageSnapshotConfig>,
    /// Video snapshot feature, when enabled.
    pub video_snapshot: Option<VideoSnapshotConfig>,
    /// Persistent recording feature, when enabled.
    pub recording: Option<RecordingConfig>,
}

impl SessionConfig {
    /// Parse configuration text straight into typed form.
    ///
    /// # Errors
    ///
    /// Propagates parse errors from [`config_file::parse`] and
    /// conversion errors from [`SessionConfig::from_blocks`].
    pub fn from_text(text: &str) -> Result<Self> {
        Self::from_blocks(&config_file::parse(text)?)
    }

    /// Convert untyped blocks. Disabled blocks are dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidCameraConfig`,
    /// `AppError::DuplicateCameraName` or `AppError::Config` for values
    /// that fail conversion.
    pub fn from_blocks(blocks: &ConfigBlocks) -> Result<Self> {
        let mut cameras: Vec<CameraConfig> = Vec::with_capacity(blocks.cameras.len());
        for block in blocks.cameras.iter().filter(|b| b.enable) {
            let camera = CameraConfig::from_block(block)?;
            if cameras.iter().any(|c| c.name == camera.name) {
                return Err(AppError::DuplicateCameraName(camera.name));
            }
            cameras.push(camera);
        }

        let enabled = |block: &Option<ConfigBlock>| block.clone().filter(|b| b.enable);

        Ok(Self {
            cameras,
            image_snapshot: enabled(&blocks.image_snapshot)
                .map(|b| ImageSnapshotConfig::from_block(&b)),
            video_snapshot: enabled(&blocks.video_snapshot)
                .map(|b| VideoSnapshotConfig::from_block(&b))
                .transpose()?,
            recording: enabled(&blocks.recording)
                .map(|b| RecordingConfig::from_block(&b))
                .transpose()?,
        })
    }

    /// Look up a camera by name.
    #[must_use]
    pub fn camera(&self, name: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.name == name)
    }

    /// Camera names in declaration order.
    #[must_use]
    pub fn camera_names(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.name.clone()).collect()
    }
}

fn number<T: FromStr>(block: &ConfigBlock, key: &str, default: T) -> Result<T> {
    Ok(optional_number(block, key)?.unwrap_or(default))
}

fn optional_number<T: FromStr>(block: &ConfigBlock, key: &str) -> Result<Option<T>> {
    block
        .get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| AppError::Config(format!("{key} must be a number, got '{raw}'")))
        })
        .transpose()
}

fn warn_unknown_keys(kind: BlockKind, block: &ConfigBlock, known: &[&str]) {
    for (key, _) in block.entries() {
        if !known.contains(&key) {
            warn!(block = kind.header(), key, "ignoring unknown config key");
        }
    }
}
