//! Media daemon process supervision.
//!
//! The daemon daemonizes itself, so starting it means running the
//! program once with the right flags and checking its exit status;
//! stopping it means running `<program> --kill`. A stop request when no
//! daemon is running is not an error.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, info_span, warn, Instrument};

use crate::config::DaemonConfig;
use crate::control::BoxFuture;
use crate::{AppError, Result};

/// Message printed by the daemon when `--kill` finds nothing to stop.
const NOT_RUNNING_MARKER: &str = "no running gstd found";

/// File name of the media framework log inside the session log directory.
pub const MEDIA_LOG_FILE: &str = "gst.log";

/// File name of the daemon's own log inside the session log directory.
pub const DAEMON_LOG_FILE: &str = "gstd.log";

/// Start/stop control over the media daemon.
pub trait DaemonControl: Send + Sync {
    /// Ensure a fresh daemon is running.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Daemon` if the daemon could not be launched.
    fn start(&self) -> BoxFuture<'_, Result<()>>;

    /// Stop the daemon if it is running.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Daemon` if the stop command could not be run.
    fn stop(&self) -> BoxFuture<'_, Result<()>>;
}

/// Supervises a locally launched daemon process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSupervisor {
    program: String,
    args: Vec<String>,
}

impl DaemonSupervisor {
    /// Assemble the daemon command line, logging into `logs_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the debug level is outside `0..=9`.
    pub fn new(config: &DaemonConfig, logs_dir: &Path) -> Result<Self> {
        if config.debug_level > 9 {
            return Err(AppError::Config(format!(
                "daemon debug level {} outside 0..=9",
                config.debug_level
            )));
        }

        let media_log = logs_dir.join(MEDIA_LOG_FILE);
        let daemon_log = logs_dir.join(DAEMON_LOG_FILE);
        let mut args = vec![
            "--gst-log-filename".to_owned(),
            media_log.to_string_lossy().into_owned(),
            "--gstd-log-filename".to_owned(),
            daemon_log.to_string_lossy().into_owned(),
            "--gst-debug-level".to_owned(),
            config.debug_level.to_string(),
            "--enable-tcp-protocol".to_owned(),
            "--tcp-address".to_owned(),
            config.address.clone(),
            "--tcp-base-port".to_owned(),
            config.port.to_string(),
            "--tcp-num-ports".to_owned(),
            "1".to_owned(),
        ];
        if let Some(http) = &config.http {
            args.extend([
                "--enable-http-protocol".to_owned(),
                "--http-address".to_owned(),
                http.address.clone(),
                "--http-port".to_owned(),
                http.port.to_string(),
            ]);
        }

        info!(program = %config.program, ?args, "daemon command line assembled");
        Ok(Self {
            program: config.program.clone(),
            args,
        })
    }

    /// Program launched.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed on start.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    async fn run_start(&self) -> Result<()> {
        if let Err(err) = self.run_stop().await {
            warn!(%err, "pre-start stop of daemon failed");
        }

        info!(program = %self.program, "starting daemon");
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|err| AppError::Daemon(format!("failed to launch {}: {err}", self.program)))?;

        if output.status.success() {
            info!("daemon started");
        } else {
            warn!(
                status = ?output.status.code(),
                "daemon start exited unsuccessfully; it may already be running"
            );
        }
        Ok(())
    }

    async fn run_stop(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("--kill")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| AppError::Daemon(format!("failed to run {} --kill: {err}", self.program)))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if stderr.contains(NOT_RUNNING_MARKER) {
            info!("no running daemon to stop");
        } else if output.status.success() {
            info!("daemon stopped");
        } else {
            warn!(status = ?output.status.code(), stderr = %stderr.trim(), "daemon stop reported failure");
        }
        Ok(())
    }
}

impl DaemonControl for DaemonSupervisor {
    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_start().instrument(info_span!("daemon_start")))
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_stop().instrument(info_span!("daemon_stop")))
    }
}

/// Daemon managed outside this process; start and stop are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalDaemon;

impl DaemonControl for ExternalDaemon {
    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async {
            info!("daemon is managed externally; not starting");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async {
            info!("daemon is managed externally; not stopping");
            Ok(())
        })
    }
}
