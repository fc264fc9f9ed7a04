//! Textual session configuration reader.
//!
//! The session file is a sequence of bracketed block headers followed by
//! `key=value` lines:
//!
//! ```text
//! # two cameras, recording only
//! [CAMERA]
//! name=camA
//! address=192.168.0.124
//! username=root
//! password=secret
//!
//! [RECORDING]
//! segment_time=15
//! ```
//!
//! `[CAMERA]` may repeat; `[IMAGE_SNAPSHOT]`, `[VIDEO_SNAPSHOT]` and
//! `[RECORDING]` appear at most once. Lines starting with `#` or `;` are
//! comments. Values stay untyped here; [`crate::models::config`] converts
//! them once into a typed configuration.

use std::fmt::Write as _;

use crate::{AppError, Result};

/// Key holding a block's enable flag.
pub const ENABLE_KEY: &str = "enable";

/// Kind of configuration block, identified by its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// One physical camera; repeatable.
    Camera,
    /// Still image snapshot feature.
    ImageSnapshot,
    /// Buffered video snapshot feature.
    VideoSnapshot,
    /// Persistent multi-segment recording feature.
    Recording,
}

impl BlockKind {
    /// Header text without brackets.
    #[must_use]
    pub fn header(self) -> &'static str {
        match self {
            Self::Camera => "CAMERA",
            Self::ImageSnapshot => "IMAGE_SNAPSHOT",
            Self::VideoSnapshot => "VIDEO_SNAPSHOT",
            Self::Recording => "RECORDING",
        }
    }

    fn from_header(header: &str) -> Option<Self> {
        match header {
            "CAMERA" => Some(Self::Camera),
            "IMAGE_SNAPSHOT" => Some(Self::ImageSnapshot),
            "VIDEO_SNAPSHOT" => Some(Self::VideoSnapshot),
            "RECORDING" => Some(Self::Recording),
            _ => None,
        }
    }
}

/// An ordered string mapping plus the block's enable flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    /// Whether the block is enabled; defaults to `true`.
    pub enable: bool,
    entries: Vec<(String, String)>,
    has_enable_line: bool,
}

impl Default for ConfigBlock {
    fn default() -> Self {
        Self {
            enable: true,
            entries: Vec::new(),
            has_enable_line: false,
        }
    }
}

impl ConfigBlock {
    /// Create an enabled block from ordered entries.
    #[must_use]
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut block = Self::default();
        for (key, value) in entries {
            block.insert(key.into(), value.into());
        }
        block
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when the block carries neither entries nor an `enable` line.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && !self.has_enable_line
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn insert(&mut self, key: String, value: String) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }
}

/// Untyped blocks read from a session configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigBlocks {
    /// Camera blocks in declaration order.
    pub cameras: Vec<ConfigBlock>,
    /// Image snapshot block, if present.
    pub image_snapshot: Option<ConfigBlock>,
    /// Video snapshot block, if present.
    pub video_snapshot: Option<ConfigBlock>,
    /// Recording block, if present.
    pub recording: Option<ConfigBlock>,
}

impl ConfigBlocks {
    /// Serialize back into the textual format accepted by [`parse`].
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for camera in &self.cameras {
            write_block(&mut out, BlockKind::Camera, camera);
        }
        let singletons = [
            (BlockKind::ImageSnapshot, &self.image_snapshot),
            (BlockKind::VideoSnapshot, &self.video_snapshot),
            (BlockKind::Recording, &self.recording),
        ];
        for (kind, block) in singletons {
            if let Some(block) = block {
                write_block(&mut out, kind, block);
            }
        }
        out
    }

    fn push(&mut self, kind: BlockKind, block: ConfigBlock) {
        if block.is_empty() {
            return;
        }
        match kind {
            BlockKind::Camera => self.cameras.push(block),
            BlockKind::ImageSnapshot => self.image_snapshot = Some(block),
            BlockKind::VideoSnapshot => self.video_snapshot = Some(block),
            BlockKind::Recording => self.recording = Some(block),
        }
    }
}

fn write_block(out: &mut String, kind: BlockKind, block: &ConfigBlock) {
    let _ = writeln!(out, "[{}]", kind.header());
    if !block.enable || block.has_enable_line {
        let _ = writeln!(out, "{ENABLE_KEY}={}", block.enable);
    }
    for (key, value) in block.entries() {
        let _ = writeln!(out, "{key}={value}");
    }
    out.push('\n');
}

/// Parse a boolean flag value.
///
/// # Errors
///
/// Returns `AppError::Config` for anything other than the accepted
/// spellings of true and false.
pub fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(AppError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

/// Parse session configuration text into ordered blocks.
///
/// Blocks with no entries and no `enable` line are dropped.
///
/// # Errors
///
/// Returns `AppError::Config` when a non-blank, non-comment line is
/// neither a recognized header nor a `key=value` pair, when a pair
/// appears before any header, or when a singleton block repeats.
pub fn parse(text: &str) -> Result<ConfigBlocks> {
    let mut blocks = ConfigBlocks::default();
    let mut current: Option<(BlockKind, ConfigBlock)> = None;
    let mut seen_singletons: Vec<BlockKind> = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let kind = BlockKind::from_header(header.trim()).ok_or_else(|| {
                AppError::Config(format!("line {line_no}: unknown block header '{line}'"))
            })?;
            if kind != BlockKind::Camera {
                if seen_singletons.contains(&kind) {
                    return Err(AppError::Config(format!(
                        "line {line_no}: block [{}] may appear only once",
                        kind.header()
                    )));
                }
                seen_singletons.push(kind);
            }
            if let Some((prev_kind, prev_block)) = current.take() {
                blocks.push(prev_kind, prev_block);
            }
            current = Some((kind, ConfigBlock::default()));
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(AppError::Config(format!(
                "line {line_no}: expected block header or key=value, got '{line}'"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::Config(format!("line {line_no}: empty key")));
        }
        let value = value.trim();

        let Some((_, block)) = current.as_mut() else {
            return Err(AppError::Config(format!(
                "line {line_no}: '{key}' appears before any block header"
            )));
        };
        if key == ENABLE_KEY {
            block.enable = parse_flag(key, value)
                .map_err(|err| AppError::Config(format!("line {line_no}: {err}")))?;
            block.has_enable_line = true;
        } else {
            block.insert(key.to_owned(), value.to_owned());
        }
    }

    if let Some((kind, block)) = current {
        blocks.push(kind, block);
    }
    Ok(blocks)
}
