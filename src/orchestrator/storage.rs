//! Session numbering and on-disk layout.
//!
//! Sessions live under a storage root as `ingest_session_{N:05}`. The
//! next number is one past the highest existing session; a directory
//! that already exists at the computed path is treated as a fault, never
//! reused.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::models::session::{
    parse_session_number, session_directory_name, Session, LOGS_DIRECTORY, SESSION_INFO_FILE,
};
use crate::{AppError, Result};

/// Next free session number under `root`: highest existing + 1, or 0.
///
/// # Errors
///
/// Returns `AppError::Storage` if `root` exists but cannot be listed, or
/// if the session counter would overflow.
pub fn next_session_number(root: &Path) -> Result<u64> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(AppError::Storage(format!(
                "cannot list {}: {err}",
                root.display()
            )))
        }
    };

    let highest = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| parse_session_number(&entry.file_name().to_string_lossy()))
        .max();

    match highest {
        None => Ok(0),
        Some(n) => n
            .checked_add(1)
            .ok_or_else(|| AppError::Storage("session number space exhausted".into())),
    }
}

/// Create the directory tree for a new session under `root`.
///
/// # Errors
///
/// Returns `AppError::Storage` if the root or session directories cannot
/// be created, or if the computed session directory already exists.
pub fn allocate_session(root: &Path) -> Result<Session> {
    fs::create_dir_all(root).map_err(|err| {
        AppError::Storage(format!("cannot create root {}: {err}", root.display()))
    })?;
    let root = root.canonicalize().map_err(|err| {
        AppError::Storage(format!("cannot resolve root {}: {err}", root.display()))
    })?;

    let number = next_session_number(&root)?;
    let directory = root.join(session_directory_name(number));
    fs::create_dir(&directory).map_err(|err| {
        if err.kind() == ErrorKind::AlreadyExists {
            AppError::Storage(format!(
                "session directory {} already exists",
                directory.display()
            ))
        } else {
            AppError::Storage(format!("cannot create {}: {err}", directory.display()))
        }
    })?;

    let logs_directory = directory.join(LOGS_DIRECTORY);
    fs::create_dir(&logs_directory).map_err(|err| {
        AppError::Storage(format!("cannot create {}: {err}", logs_directory.display()))
    })?;

    let session = Session {
        number,
        directory,
        logs_directory,
        created_at: Utc::now(),
    };
    info!(
        session = session.number,
        directory = %session.directory.display(),
        "session allocated"
    );
    Ok(session)
}

/// File name used for the configuration copy. Names that collide with the
/// session's own entries get a `config_` prefix.
#[must_use]
pub fn config_copy_name(config_name: &str) -> String {
    if config_name == SESSION_INFO_FILE || config_name == LOGS_DIRECTORY {
        format!("config_{config_name}")
    } else {
        config_name.to_owned()
    }
}

/// Write the verbatim configuration copy and the session header file.
///
/// # Errors
///
/// Returns `AppError::Storage` if either file cannot be written.
pub fn record_session_files(session: &Session, config_name: &str, config_text: &str) -> Result<()> {
    let config_copy = session.directory.join(config_copy_name(config_name));
    fs::write(&config_copy, config_text).map_err(|err| {
        AppError::Storage(format!("cannot write {}: {err}", config_copy.display()))
    })?;

    let header = session.directory.join(SESSION_INFO_FILE);
    fs::write(&header, session.header())
        .map_err(|err| AppError::Storage(format!("cannot write {}: {err}", header.display())))?;
    Ok(())
}
