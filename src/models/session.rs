//! Session identity and orchestrator lifecycle.

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Prefix of every session directory name under the storage root.
pub const SESSION_DIRECTORY_PREFIX: &str = "ingest_session_";

/// Name of the per-session log directory.
pub const LOGS_DIRECTORY: &str = "logs";

/// Name of the human-readable session header file.
pub const SESSION_INFO_FILE: &str = "session_info.txt";

/// Directory name for session `number`, zero-padded to five digits.
#[must_use]
pub fn session_directory_name(number: u64) -> String {
    format!("{SESSION_DIRECTORY_PREFIX}{number:05}")
}

/// Extract the session number from a directory name, if it is one.
#[must_use]
pub fn parse_session_number(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SESSION_DIRECTORY_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Allocating storage, starting the daemon, connecting.
    Initializing,
    /// All pipelines created; nothing played yet.
    TopologyBuilt,
    /// Cameras playing; triggers accepted.
    Running,
    /// Ordered shutdown in progress.
    Draining,
    /// All pipelines deleted and the daemon stopped.
    TornDown,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::TopologyBuilt | Self::TornDown)
                | (
                    Self::TopologyBuilt | Self::Running,
                    Self::Running | Self::Draining | Self::TornDown
                )
                | (Self::Draining, Self::Draining | Self::TornDown)
        )
    }
}

/// An allocated ingest session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Monotonic session number; never reused.
    pub number: u64,
    /// Absolute session directory.
    pub directory: PathBuf,
    /// Absolute log directory inside the session directory.
    pub logs_directory: PathBuf,
    /// Creation time, UTC.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Creation time in the local timezone.
    #[must_use]
    pub fn created_local(&self) -> DateTime<Local> {
        self.created_at.with_timezone(&Local)
    }

    /// Contents of the session header file.
    #[must_use]
    pub fn header(&self) -> String {
        format!(
            "session number: {}\nsession directory: {}\ncreated (local): {}\ncreated (utc): {}\n",
            self.number,
            self.directory.display(),
            self.created_local().format("%Y-%m-%d %H:%M:%S %Z"),
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}
