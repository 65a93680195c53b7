#![forbid(unsafe_code)]

//! `agent-foreman` supervises long-running agent worker sessions.
//!
//! Sessions are persisted as one JSON record each under a state root. A
//! worker is either a local process group or a command running inside an
//! existing container. On top of the session lifecycle the crate provides
//! log streaming, state snapshots, bulk prune and archive, export bundles,
//! and a priority scheduler for feature backlogs.

pub mod audit;
pub mod config;
pub mod driver;
pub mod duration;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod scheduler;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
