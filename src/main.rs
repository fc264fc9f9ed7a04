#![forbid(unsafe_code)]

//! `ingest-orchestrator`: camera ingest session orchestrator binary.
//!
//! `plan` validates a session configuration and prints the pipeline
//! topology it would build. `rehearse` runs a full session against the
//! in-memory control channel and accepts capture commands on stdin.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use ingest_orchestrator::control::memory::{MemoryChannel, MemoryConnector};
use ingest_orchestrator::models::config::SessionConfig;
use ingest_orchestrator::models::session::session_directory_name;
use ingest_orchestrator::orchestrator::session_manager::{
    CameraSelector, ConfigSource, Orchestrator,
};
use ingest_orchestrator::orchestrator::storage::next_session_number;
use ingest_orchestrator::orchestrator::topology::plan_topology;
use ingest_orchestrator::{AppError, Result, Settings};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ingest-orchestrator", about = "Camera ingest session orchestrator", version, long_about = None)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a session configuration and print the planned topology as JSON.
    Plan {
        /// Session configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Operational settings (TOML).
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Storage root the session would be allocated under.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Run a session against the in-memory control channel.
    ///
    /// The media daemon is still launched and stopped when
    /// `[daemon] manage` is set; set it to false to rehearse without one.
    Rehearse {
        /// Session configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Operational settings (TOML).
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Storage root for session directories.
        #[arg(long)]
        root: PathBuf,
    },
}

/// One line of rehearsal input.
#[derive(Debug, PartialEq, Eq)]
enum RehearsalCommand {
    Image {
        selector: CameraSelector,
        location: Option<String>,
    },
    Video {
        duration_secs: Option<u64>,
        location: Option<String>,
    },
    RecordStart,
    RecordStop,
    Quit,
}

enum CaptureHandle {
    Image(JoinHandle<Vec<String>>),
    Video(JoinHandle<Result<PathBuf>>),
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args.command))
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Plan {
            config,
            settings,
            root,
        } => print_plan(&config, settings.as_deref(), &root),
        Command::Rehearse {
            config,
            settings,
            root,
        } => rehearse(&config, settings.as_deref(), &root).await,
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    path.map_or_else(|| Ok(Settings::default()), Settings::load_from_path)
}

fn print_plan(config: &Path, settings: Option<&Path>, root: &Path) -> Result<()> {
    let settings = load_settings(settings)?;
    let source = ConfigSource::from_path(config)?;
    let session_config = SessionConfig::from_text(&source.text)?;
    let session_dir = root.join(session_directory_name(next_session_number(root)?));

    let plan = plan_topology(&session_config, &settings, &session_dir)?;
    let rendered = serde_json::to_string_pretty(&plan)
        .map_err(|err| AppError::Config(format!("cannot render plan: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn rehearse(config: &Path, settings: Option<&Path>, root: &Path) -> Result<()> {
    let settings = load_settings(settings)?;
    let source = ConfigSource::from_path(config)?;

    let channel = MemoryChannel::new();
    let connector = MemoryConnector::new(Arc::clone(&channel));
    if settings.daemon.manage {
        info!(program = %settings.daemon.program, "launching the configured media daemon");
    }
    let mut orchestrator = Orchestrator::start(root, source, settings, &connector).await?;
    info!(directory = %orchestrator.session().directory.display(), "rehearsal session started");

    orchestrator.start_cameras().await?;
    orchestrator.start_buffers().await?;
    if let Some(outputs) = orchestrator.start_persistent_recording().await {
        info!(?outputs, "recording to");
    }

    let ct = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let supervisor = tokio::spawn(supervise_captures(rx, ct.clone()));

    let signal_ct = ct.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "ctrl-c signal handler failed");
            return;
        }
        info!("interrupt received");
        signal_ct.cancel();
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = ct.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(RehearsalCommand::Quit) => break,
            Ok(command) => dispatch(&orchestrator, command, &tx).await,
            Err(err) => warn!(input = %line.trim(), %err, "unrecognized command"),
        }
    }

    drop(tx);
    if let Err(err) = supervisor.await {
        error!(%err, "capture supervisor panicked");
    }
    orchestrator.shutdown().await;
    info!(remaining = channel.pipelines().len(), "rehearsal finished");
    Ok(())
}

async fn dispatch(
    orchestrator: &Orchestrator,
    command: RehearsalCommand,
    tx: &mpsc::UnboundedSender<CaptureHandle>,
) {
    let handle = match command {
        RehearsalCommand::Image { selector, location } => orchestrator
            .take_image_snapshot(&selector, location.as_deref())
            .map(CaptureHandle::Image),
        RehearsalCommand::Video {
            duration_secs,
            location,
        } => orchestrator
            .take_video_snapshot(duration_secs, location.as_deref())
            .map(CaptureHandle::Video),
        RehearsalCommand::RecordStart => {
            if let Some(outputs) = orchestrator.start_persistent_recording().await {
                info!(?outputs, "recording to");
            }
            return;
        }
        RehearsalCommand::RecordStop => {
            orchestrator.stop_persistent_recording().await;
            return;
        }
        RehearsalCommand::Quit => return,
    };

    match handle {
        Ok(handle) => {
            if tx.send(handle).is_err() {
                warn!("capture supervisor has stopped");
            }
        }
        Err(err) => warn!(%err, "trigger rejected"),
    }
}

/// Await every capture handle and log its outcome. On cancellation the
/// remaining captures are aborted.
async fn supervise_captures(
    mut rx: mpsc::UnboundedReceiver<CaptureHandle>,
    ct: CancellationToken,
) {
    let mut pending: Vec<CaptureHandle> = Vec::new();
    loop {
        tokio::select! {
            () = ct.cancelled() => break,
            next = rx.recv() => match next {
                Some(handle) => pending.push(handle),
                None => break,
            },
        }
    }

    for handle in pending {
        match handle {
            CaptureHandle::Image(handle) => {
                if ct.is_cancelled() {
                    handle.abort();
                }
                match handle.await {
                    Ok(cameras) => info!(?cameras, "image capture finished"),
                    Err(err) => warn!(%err, "image capture did not complete"),
                }
            }
            CaptureHandle::Video(handle) => {
                if ct.is_cancelled() {
                    handle.abort();
                }
                match handle.await {
                    Ok(Ok(path)) => info!(path = %path.display(), "video capture finished"),
                    Ok(Err(err)) => warn!(%err, "video capture failed"),
                    Err(err) => warn!(%err, "video capture did not complete"),
                }
            }
        }
    }
}

fn parse_command(line: &str) -> std::result::Result<RehearsalCommand, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let first = words.next();
    let second = words.next().map(str::to_owned);

    match verb {
        "image" => Ok(RehearsalCommand::Image {
            selector: first.map_or(CameraSelector::All, CameraSelector::parse),
            location: second,
        }),
        "video" => {
            let duration_secs = first
                .map(|raw| {
                    raw.parse::<u64>()
                        .map_err(|_| format!("duration must be whole seconds, got '{raw}'"))
                })
                .transpose()?;
            Ok(RehearsalCommand::Video {
                duration_secs,
                location: second,
            })
        }
        "record" => match first {
            Some("start") => Ok(RehearsalCommand::RecordStart),
            Some("stop") => Ok(RehearsalCommand::RecordStop),
            _ => Err("expected 'record start' or 'record stop'".into()),
        },
        "quit" | "exit" => Ok(RehearsalCommand::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
