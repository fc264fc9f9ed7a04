//! Output path templates and placeholder substitution.
//!
//! Templates are `/`-separated paths split into a directory portion and a
//! filename portion. Relative templates resolve against the session
//! directory. Supported placeholders:
//!
//! - `{camera}`: camera name
//! - `{timestamp}`: local time of the trigger, `%Y%m%d_%H%M%S`
//! - `%d` / `%05d`: segment number, left for the daemon to fill in

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;

/// Camera-name placeholder.
pub const CAMERA_PLACEHOLDER: &str = "{camera}";

/// Trigger timestamp placeholder.
pub const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";

fn segment_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%\d*d").ok()).as_ref()
}

/// Whether `text` contains a printf-style segment-number placeholder.
#[must_use]
pub fn has_segment_placeholder(text: &str) -> bool {
    segment_pattern().is_some_and(|re| re.is_match(text))
}

/// Local timestamp used for `{timestamp}` substitution.
#[must_use]
pub fn timestamp_now() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// A path template split into directory and filename portions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    directory: String,
    filename: String,
}

impl PathTemplate {
    /// Split `template` at its last `/`.
    #[must_use]
    pub fn new(template: &str) -> Self {
        match template.rsplit_once('/') {
            Some(("", filename)) => Self {
                directory: "/".to_owned(),
                filename: filename.to_owned(),
            },
            Some((directory, filename)) => Self {
                directory: directory.to_owned(),
                filename: filename.to_owned(),
            },
            None => Self {
                directory: String::new(),
                filename: template.to_owned(),
            },
        }
    }

    /// Directory portion, unresolved.
    #[must_use]
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Filename portion, unresolved.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Whether the camera placeholder appears in the directory portion.
    #[must_use]
    pub fn directory_has_camera(&self) -> bool {
        self.directory.contains(CAMERA_PLACEHOLDER)
    }

    /// Whether the camera placeholder appears in the filename portion.
    #[must_use]
    pub fn filename_has_camera(&self) -> bool {
        self.filename.contains(CAMERA_PLACEHOLDER)
    }

    /// Whether either portion carries the camera placeholder.
    #[must_use]
    pub fn has_camera_placeholder(&self) -> bool {
        self.directory_has_camera() || self.filename_has_camera()
    }

    /// Whether the filename portion carries a segment-number placeholder.
    #[must_use]
    pub fn filename_has_segment(&self) -> bool {
        has_segment_placeholder(&self.filename)
    }

    /// Resolve the directory portion for one camera under `base`.
    #[must_use]
    pub fn resolve_directory(&self, base: &Path, camera: &str, timestamp: &str) -> PathBuf {
        let directory = substitute(&self.directory, camera, timestamp);
        if directory.is_empty() {
            base.to_path_buf()
        } else {
            base.join(directory)
        }
    }

    /// Resolve the full output path for one camera under `base`.
    #[must_use]
    pub fn resolve(&self, base: &Path, camera: &str, timestamp: &str) -> PathBuf {
        self.resolve_directory(base, camera, timestamp)
            .join(substitute(&self.filename, camera, timestamp))
    }
}

fn substitute(text: &str, camera: &str, timestamp: &str) -> String {
    text.replace(CAMERA_PLACEHOLDER, camera)
        .replace(TIMESTAMP_PLACEHOLDER, timestamp)
}
