//! Structured audit trail for session lifecycle events.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`JsonlAuditWriter`], appends JSONL records to
//! daily-rotating files under `<state_root>/audit/`.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Worker started.
    SessionStart,
    /// Worker stopped by the operator.
    SessionStop,
    /// Worker suspended.
    SessionPause,
    /// Worker continued.
    SessionResume,
    /// Worker re-spawned.
    SessionRestart,
    /// Record and log deleted.
    SessionRemove,
    /// Record moved into the archive area.
    SessionArchive,
    /// Record moved back from the archive area.
    SessionUnarchive,
    /// Record removed by a prune sweep.
    SessionPrune,
    /// Running record found dead and marked completed.
    SessionReconcile,
    /// Snapshot captured.
    SnapshotSave,
    /// Snapshot copied back over live state.
    SnapshotRestore,
    /// Snapshot deleted.
    SnapshotDelete,
    /// Backlog reordered and persisted.
    PlanPrioritize,
}

/// A structured record of one lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Session the event concerns, if any.
    pub session: Option<String>,
    /// Snapshot or plan the event concerns, if any.
    pub target: Option<String>,
    /// Worker command line, for start and restart events.
    pub command: Option<String>,
    /// Brief result description.
    pub result_summary: Option<String>,
}

impl AuditEntry {
    /// Construct a minimal audit entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            session: None,
            target: None,
            command: None,
            result_summary: None,
        }
    }

    /// Set the session name for this entry.
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Set the snapshot or plan this entry concerns.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the worker command for this entry.
    #[must_use]
    pub fn with_command(mut self, command: &[String]) -> Self {
        self.command = Some(command.join(" "));
        self
    }

    /// Set the result summary for this entry.
    #[must_use]
    pub fn with_result(mut self, summary: impl Into<String>) -> Self {
        self.result_summary = Some(summary.into());
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

/// Record `entry` if a logger is configured; failures only warn.
pub(crate) fn record(logger: Option<&dyn AuditLogger>, entry: AuditEntry) {
    if let Some(logger) = logger {
        if let Err(err) = logger.log_entry(entry) {
            tracing::warn!(%err, "failed to append audit entry");
        }
    }
}

pub use writer::JsonlAuditWriter;
