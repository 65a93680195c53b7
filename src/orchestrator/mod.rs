//! Session orchestration modules.
//!
//! Covers worker supervision, the session state machine, log streaming,
//! snapshots, pruning, and export bundles.

pub mod bundle;
pub mod log_stream;
pub mod prune;
pub mod session_manager;
pub mod snapshot_manager;
pub mod supervisor;
pub mod workspace_guard;

use std::fmt::Write as _;

use crate::{AppError, Result};

pub use log_stream::LogLine;
pub use prune::{PruneOptions, PruneReport};
pub use session_manager::{SessionOrchestrator, StartRequest};
pub use snapshot_manager::SnapshotManager;
pub use supervisor::{LocalSupervisor, ProcessSupervisor, SpawnOutcome};
pub use workspace_guard::WorkspaceGuard;

/// Which records a batch operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every record in the source area.
    All,
    /// The named records, in order.
    Names(Vec<String>),
}

/// Per-item outcome of a batch operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items that completed.
    pub succeeded: Vec<String>,
    /// Items that failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    /// Whether every item completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn a report with failures into `AppError::Partial`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Partial` naming every failed and succeeded item
    /// when at least one item failed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        let mut msg = format!(
            "{} of {} items failed:",
            self.failed.len(),
            self.failed.len() + self.succeeded.len()
        );
        for (name, err) in &self.failed {
            let _ = write!(msg, " {name} ({err});");
        }
        if !self.succeeded.is_empty() {
            let _ = write!(msg, " succeeded: {}", self.succeeded.join(", "));
        }
        Err(AppError::Partial(msg))
    }
}
