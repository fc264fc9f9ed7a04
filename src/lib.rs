#![forbid(unsafe_code)]

//! Session orchestrator for a pipeline-based camera ingest system.
//!
//! Builds a named, cross-wired set of media pipelines on an external
//! daemon from a textual session configuration, drives them through a
//! session lifecycle and runs triggered image and video captures.

pub mod config;
pub mod config_file;
pub mod control;
pub mod daemon;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod templates;

pub use config::Settings;
pub use errors::{AppError, Result};
