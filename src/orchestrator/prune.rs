//! Bulk cleanup of finished sessions.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};

use super::{BatchReport, SessionOrchestrator};
use crate::audit::{AuditEntry, AuditEventType};
use crate::models::session::SessionRecord;
use crate::{AppError, Result};

/// Which sessions a prune sweep targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOptions {
    /// Include every session, not only terminal ones.
    pub all: bool,
    /// Only sessions started longer ago than this.
    pub since: Option<Duration>,
    /// Report candidates without touching anything.
    pub dry_run: bool,
}

/// Outcome of a prune sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Sessions selected for pruning.
    pub candidates: Vec<String>,
    /// Per-candidate results; empty on a dry run.
    pub outcome: BatchReport,
}

impl PruneOptions {
    /// Whether `record` is selected by these options.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidArgument` if `since` is too large to subtract from now.
    pub fn selects(&self, record: &SessionRecord) -> Result<bool> {
        if !self.all && !record.status.is_terminal() {
            return Ok(false);
        }
        let Some(since) = self.since else {
            return Ok(true);
        };
        let age = chrono::Duration::from_std(since)
            .map_err(|err| AppError::InvalidArgument(format!("duration out of range: {err}")))?;
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .ok_or_else(|| AppError::InvalidArgument("duration out of range".into()))?;
        Ok(record.start_time < cutoff)
    }
}

impl SessionOrchestrator {
    /// Remove finished sessions together with their workspaces and containers.
    ///
    /// Workspace deletion and container removal are best effort; a workspace
    /// outside the safe-deletion allowlist is left in place. A failure on one
    /// candidate never stops the sweep.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the store cannot be listed. Per-candidate
    /// failures are reported in [`PruneReport::outcome`].
    pub async fn prune_sessions(&self, options: &PruneOptions) -> Result<PruneReport> {
        let span = info_span!("prune_sessions", all = options.all, dry_run = options.dry_run);
        async move {
            let mut candidates = Vec::new();
            for record in self.list_sessions().await? {
                if options.selects(&record)? {
                    candidates.push(record);
                }
            }

            let mut report = PruneReport {
                candidates: candidates.iter().map(|r| r.name.clone()).collect(),
                outcome: BatchReport::default(),
            };
            if options.dry_run {
                info!(count = report.candidates.len(), "dry run, nothing removed");
                return Ok(report);
            }

            for record in candidates {
                self.clean_workspace(&record).await;
                self.clean_container(&record).await;

                match self.remove_session(&record.name, true).await {
                    Ok(()) => {
                        self.audit(
                            AuditEntry::new(AuditEventType::SessionPrune).with_session(&record.name),
                        );
                        report.outcome.succeeded.push(record.name);
                    }
                    Err(err) => {
                        warn!(session = record.name, %err, "prune failed");
                        report.outcome.failed.push((record.name, err.to_string()));
                    }
                }
            }

            info!(
                pruned = report.outcome.succeeded.len(),
                failed = report.outcome.failed.len(),
                "prune complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn clean_workspace(&self, record: &SessionRecord) {
        let workspace = &record.workspace;
        if !self.guard.is_safe_to_delete(workspace) {
            warn!(
                session = record.name,
                workspace = %workspace.display(),
                "workspace outside the safe-deletion allowlist, leaving it in place"
            );
            return;
        }
        match tokio::fs::remove_dir_all(workspace).await {
            Ok(()) => info!(session = record.name, workspace = %workspace.display(), "workspace removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(session = record.name, %err, "failed to remove workspace"),
        }
    }

    async fn clean_container(&self, record: &SessionRecord) {
        let Some(id) = record.container() else {
            return;
        };
        match self.runtime.remove(id).await {
            Ok(()) => info!(session = record.name, container = id, "container removed"),
            Err(err) if err.is_not_found() => {}
            Err(err) => warn!(session = record.name, container = id, %err, "failed to remove container"),
        }
    }
}
