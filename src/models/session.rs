//! Session record model and lifecycle helpers.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Lifecycle status for a supervised worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Record created, worker not yet spawned.
    Pending,
    /// Worker process or container is running.
    Running,
    /// Worker suspended by the operator.
    Paused,
    /// Worker stopped by the operator.
    Stopped,
    /// Worker exited on its own.
    Completed,
    /// Worker failed to start or crashed.
    Error,
}

impl SessionStatus {
    /// Stable lowercase label used in listings and on disk.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Terminal statuses are the default prune candidates.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }

    /// Whether a worker in this status may still hold a live process.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and lifecycle snapshot of one worker, persisted as `sessions/<name>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// Unique key; immutable after creation.
    pub name: String,
    /// Local process id; 0 if not locally spawned.
    #[serde(default)]
    pub pid: u32,
    /// Container id when the worker runs in a container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Argument vector used to (re)start the worker.
    pub command: Vec<String>,
    /// Absolute working directory; immutable.
    pub workspace: PathBuf,
    /// Append-only output log; derived from `name`.
    pub log_file: PathBuf,
    /// Auxiliary mutable state persisted by the worker.
    pub agent_state_file: PathBuf,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Time of the most recent (re)start.
    pub start_time: DateTime<Utc>,
    /// Set once the worker reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Last failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Workspace revision captured at start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_commit_sha: Option<String>,
    /// Workspace revision captured at stop or completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_commit_sha: Option<String>,
}

impl SessionRecord {
    /// Construct a `Pending` record.
    #[must_use]
    pub fn new(
        name: String,
        command: Vec<String>,
        workspace: PathBuf,
        log_file: PathBuf,
        agent_state_file: PathBuf,
    ) -> Self {
        Self {
            name,
            pid: 0,
            container_id: None,
            command,
            workspace,
            log_file,
            agent_state_file,
            status: SessionStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            start_commit_sha: None,
            end_commit_sha: None,
        }
    }

    /// Container id when process control is delegated to the container
    /// runtime. An empty id counts as none.
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::{Completed, Error, Paused, Pending, Running, Stopped};

        matches!(
            (self.status, next),
            (Pending, Running | Error)
                | (Running, Paused | Stopped | Completed | Error)
                | (Paused, Running | Stopped | Completed | Error)
                | (Stopped | Completed | Error, Running)
        )
    }

    /// Move to `next`, stamping `end_time` on terminal statuses.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the edge is not in the state machine.
    pub fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "session '{}' cannot move from {} to {next}",
                self.name, self.status
            )));
        }

        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
        } else if next == SessionStatus::Running {
            self.end_time = None;
        }
        Ok(())
    }
}
