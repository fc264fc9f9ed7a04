//! Session orchestration modules.
//!
//! Covers session storage allocation, topology planning and
//! construction, triggered capture workers and the session lifecycle.

pub mod capture;
pub mod session_manager;
pub mod storage;
pub mod topology;
