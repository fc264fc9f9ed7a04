//! Domain model module declarations.

pub mod config;
pub mod pipeline;
pub mod session;
