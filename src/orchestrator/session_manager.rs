//! Session lifecycle management: start, stop, pause, resume, restart,
//! remove, archive.
//!
//! [`SessionOrchestrator`] composes the [`SessionStore`] with a
//! [`ProcessSupervisor`] and owns the session state machine. Every mutating
//! operation holds the record's advisory lock from load to save, so two
//! invocations never interleave on one record.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::supervisor::{LocalSupervisor, ProcessSupervisor};
use super::workspace_guard::WorkspaceGuard;
use super::{BatchReport, Selection};
use crate::audit::{self, AuditEntry, AuditEventType, AuditLogger, JsonlAuditWriter};
use crate::config::GlobalConfig;
use crate::driver::{ContainerRuntime, DockerCli, GitCli, VersionControl};
use crate::models::session::{SessionRecord, SessionStatus};
use crate::models::validate_name;
use crate::persistence::SessionStore;
use crate::{AppError, Result};

/// Workspace-relative file where workers persist auxiliary state.
pub const AGENT_STATE_FILE: &str = ".agent_state.json";

/// Parameters of a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Unique session name.
    pub name: String,
    /// Worker argument vector.
    pub command: Vec<String>,
    /// Existing working directory.
    pub workspace: PathBuf,
    /// Run inside this existing container instead of a local process.
    pub container_id: Option<String>,
}

/// Owner of the session state machine.
pub struct SessionOrchestrator {
    pub(crate) store: SessionStore,
    pub(crate) supervisor: Arc<dyn ProcessSupervisor>,
    pub(crate) vcs: Arc<dyn VersionControl>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) audit: Option<Arc<dyn AuditLogger>>,
    pub(crate) guard: WorkspaceGuard,
    pub(crate) log_poll_interval: Duration,
}

impl SessionOrchestrator {
    /// Assemble an orchestrator from explicit collaborators.
    #[must_use]
    pub fn new(
        store: SessionStore,
        supervisor: Arc<dyn ProcessSupervisor>,
        vcs: Arc<dyn VersionControl>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &GlobalConfig,
    ) -> Self {
        Self {
            store,
            supervisor,
            vcs,
            runtime,
            audit: None,
            guard: WorkspaceGuard::from_config(&config.prune),
            log_poll_interval: config.log_poll_interval(),
        }
    }

    /// Build the production stack: docker and git CLIs, local supervisor,
    /// and a JSONL audit trail under the state root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state directories cannot be created.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(&config.container));
        let vcs: Arc<dyn VersionControl> = Arc::new(GitCli::new(&config.vcs));
        let supervisor = Arc::new(LocalSupervisor::new(
            Arc::clone(&runtime),
            config.stop_grace(),
        ));
        let store = SessionStore::open(config.sessions_dir())?;
        let audit = JsonlAuditWriter::new(config.audit_dir())?;
        Ok(Self::new(store, supervisor, vcs, runtime, config).with_audit(Arc::new(audit)))
    }

    /// Attach an audit logger.
    #[must_use]
    pub fn with_audit(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    /// Replace the prune safe-deletion allowlist.
    #[must_use]
    pub fn with_workspace_guard(mut self, guard: WorkspaceGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Underlying record store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Version-control collaborator, shared with the snapshot manager.
    #[must_use]
    pub fn vcs(&self) -> Arc<dyn VersionControl> {
        Arc::clone(&self.vcs)
    }

    /// Attached audit logger, shared with the snapshot manager and scheduler.
    #[must_use]
    pub fn audit_logger(&self) -> Option<Arc<dyn AuditLogger>> {
        self.audit.clone()
    }

    pub(crate) fn audit(&self, entry: AuditEntry) {
        audit::record(self.audit.as_deref(), entry);
    }

    /// Create a record and spawn its worker.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidArgument` for a bad name or an empty command.
    /// - `AppError::NotFound` if the workspace does not exist.
    /// - `AppError::AlreadyExists` if the name is taken (active or archived).
    /// - Any supervisor error; the record is then kept with status `Error`.
    pub async fn start_session(&self, request: StartRequest) -> Result<SessionRecord> {
        let span = info_span!("start_session", name = %request.name);
        async move {
            let StartRequest {
                name,
                command,
                workspace,
                container_id,
            } = request;

            validate_name("session", &name)?;
            let container_id = container_id.filter(|id| !id.trim().is_empty());
            if command.is_empty() && container_id.is_none() {
                return Err(AppError::InvalidArgument("command cannot be empty".into()));
            }
            let workspace = resolve_workspace(&workspace)?;

            let _lock = self.store.lock(&name).await?;
            if self.store.exists(&name) {
                return Err(AppError::AlreadyExists(format!(
                    "session '{name}' already exists"
                )));
            }
            if self.store.archived_exists(&name) {
                return Err(AppError::AlreadyExists(format!(
                    "session '{name}' exists in the archive"
                )));
            }

            let log_file = self.store.log_path(&name);
            let agent_state_file = workspace.join(AGENT_STATE_FILE);
            let mut record =
                SessionRecord::new(name, command, workspace, log_file, agent_state_file);
            record.container_id = container_id;
            self.store.save(&record)?;

            let outcome = match self.supervisor.start(&record).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(%err, "worker failed to start");
                    record.error = Some(err.to_string());
                    record.transition(SessionStatus::Error)?;
                    self.store.save(&record)?;
                    return Err(err);
                }
            };

            record.pid = outcome.pid;
            if outcome.container_id.is_some() {
                record.container_id = outcome.container_id;
            }
            record.start_time = Utc::now();
            record.start_commit_sha = self.capture_commit(&record.workspace).await;
            record.transition(SessionStatus::Running)?;
            self.store.save(&record)?;

            self.audit(
                AuditEntry::new(AuditEventType::SessionStart)
                    .with_session(&record.name)
                    .with_command(&record.command),
            );
            info!(pid = record.pid, container = ?record.container_id, "session started");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Stop a running or paused worker and mark the record `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session and
    /// `AppError::InvalidState` if it is not running or paused.
    pub async fn stop_session(&self, name: &str) -> Result<SessionRecord> {
        let span = info_span!("stop_session", name);
        async move {
            let _lock = self.store.lock(name).await?;
            let mut record = self.store.load(name)?;
            if !record.status.is_live() {
                return Err(AppError::InvalidState(format!(
                    "session '{name}' is not running (status: {})",
                    record.status
                )));
            }

            self.supervisor.stop(&record).await?;

            record.end_commit_sha = self.capture_commit(&record.workspace).await;
            record.transition(SessionStatus::Stopped)?;
            self.store.save(&record)?;

            self.audit(AuditEntry::new(AuditEventType::SessionStop).with_session(name));
            info!("session stopped");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Suspend a running worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the session is not running (a dead
    /// worker is reconciled to `Completed` first) and `AppError::Unsupported`
    /// if its container cannot be paused.
    pub async fn pause_session(&self, name: &str) -> Result<SessionRecord> {
        let span = info_span!("pause_session", name);
        async move {
            let _lock = self.store.lock(name).await?;
            let mut record = self.store.load(name)?;
            if record.status == SessionStatus::Running && self.reconcile_if_stale(&mut record).await? {
                return Err(AppError::InvalidState(format!(
                    "session '{name}' is not running (process not found)"
                )));
            }

            self.supervisor.pause(&record).await?;
            record.transition(SessionStatus::Paused)?;
            self.store.save(&record)?;

            self.audit(AuditEntry::new(AuditEventType::SessionPause).with_session(name));
            info!("session paused");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Continue a paused worker. The pid and container id are unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the session is not paused.
    pub async fn resume_session(&self, name: &str) -> Result<SessionRecord> {
        let span = info_span!("resume_session", name);
        async move {
            let _lock = self.store.lock(name).await?;
            let mut record = self.store.load(name)?;
            if record.status == SessionStatus::Paused && self.reconcile_if_stale(&mut record).await? {
                return Err(AppError::InvalidState(format!(
                    "session '{name}' is not paused (process not found)"
                )));
            }

            self.supervisor.resume(&record).await?;
            record.transition(SessionStatus::Running)?;
            self.store.save(&record)?;

            self.audit(AuditEntry::new(AuditEventType::SessionResume).with_session(name));
            info!("session resumed");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Re-spawn a worker that is no longer running, with its stored command
    /// and workspace.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the worker is still running.
    pub async fn restart_session(&self, name: &str) -> Result<SessionRecord> {
        let span = info_span!("restart_session", name);
        async move {
            let _lock = self.store.lock(name).await?;
            let mut record = self.store.load(name)?;

            let outcome = match self.supervisor.restart(&record).await {
                Ok(outcome) => outcome,
                Err(err @ AppError::InvalidState(_)) => return Err(err),
                Err(err) => {
                    warn!(%err, "worker failed to restart");
                    record.error = Some(err.to_string());
                    self.store.save(&record)?;
                    return Err(err);
                }
            };

            if record.status.is_live() {
                // The stored status outlived its worker.
                record.transition(SessionStatus::Completed)?;
            }
            record.pid = outcome.pid;
            if outcome.container_id.is_some() {
                record.container_id = outcome.container_id;
            }
            record.start_time = Utc::now();
            record.error = None;
            record.end_commit_sha = None;
            record.start_commit_sha = self.capture_commit(&record.workspace).await;
            record.transition(SessionStatus::Running)?;
            self.store.save(&record)?;

            self.audit(
                AuditEntry::new(AuditEventType::SessionRestart)
                    .with_session(name)
                    .with_command(&record.command),
            );
            info!(pid = record.pid, "session restarted");
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Delete a record and its log.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session and
    /// `AppError::ResourceBusy` if its worker is running and `force` is unset.
    pub async fn remove_session(&self, name: &str, force: bool) -> Result<()> {
        let span = info_span!("remove_session", name, force);
        async move {
            let _lock = self.store.lock(name).await?;
            let record = self.store.load(name)?;

            if record.status.is_live() && self.supervisor.is_running(&record).await {
                if !force {
                    return Err(AppError::ResourceBusy(format!(
                        "session '{name}' is running; stop it first or force removal"
                    )));
                }
                self.supervisor.stop(&record).await?;
            }

            self.store.remove(name)?;
            self.audit(AuditEntry::new(AuditEventType::SessionRemove).with_session(name));
            info!("session removed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Load one active record, reconciling it if its worker died.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session.
    pub async fn get_session(&self, name: &str) -> Result<SessionRecord> {
        let record = self.store.load(name)?;
        self.refresh(record).await
    }

    /// All active records. Records claiming to be live whose worker is gone
    /// are rewritten as `Completed` first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the store cannot be scanned.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut sessions = Vec::new();
        for record in self.store.list()? {
            let name = record.name.clone();
            match self.refresh(record).await {
                Ok(record) => sessions.push(record),
                Err(err) if err.is_not_found() => debug!(session = name, "removed during listing"),
                Err(err) => return Err(err),
            }
        }
        Ok(sessions)
    }

    /// All archived records.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the archive cannot be scanned.
    pub fn list_archived(&self) -> Result<Vec<SessionRecord>> {
        self.store.list_archived()
    }

    /// Move a record into the archive area.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if there is no active record.
    pub async fn archive_session(&self, name: &str) -> Result<()> {
        let _lock = self.store.lock(name).await?;
        self.store.archive(name)?;
        self.audit(AuditEntry::new(AuditEventType::SessionArchive).with_session(name));
        info!(session = name, "session archived");
        Ok(())
    }

    /// Move a record back from the archive area.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if there is no archived record.
    pub async fn unarchive_session(&self, name: &str) -> Result<()> {
        let _lock = self.store.lock(name).await?;
        self.store.unarchive(name)?;
        self.audit(AuditEntry::new(AuditEventType::SessionUnarchive).with_session(name));
        info!(session = name, "session unarchived");
        Ok(())
    }

    /// Archive several records, continuing past individual failures.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` only if `Selection::All` cannot list the store;
    /// per-item failures land in the report.
    pub async fn archive_sessions(&self, selection: &Selection) -> Result<BatchReport> {
        let names = match selection {
            Selection::All => self.store.list()?.into_iter().map(|r| r.name).collect(),
            Selection::Names(names) => names.clone(),
        };
        let mut report = BatchReport::default();
        for name in names {
            match self.archive_session(&name).await {
                Ok(()) => report.succeeded.push(name),
                Err(err) => {
                    warn!(session = name, %err, "archive failed");
                    report.failed.push((name, err.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Unarchive several records, continuing past individual failures.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` only if `Selection::All` cannot list the archive.
    pub async fn unarchive_sessions(&self, selection: &Selection) -> Result<BatchReport> {
        let names = match selection {
            Selection::All => self
                .store
                .list_archived()?
                .into_iter()
                .map(|r| r.name)
                .collect(),
            Selection::Names(names) => names.clone(),
        };
        let mut report = BatchReport::default();
        for name in names {
            match self.unarchive_session(&name).await {
                Ok(()) => report.succeeded.push(name),
                Err(err) => {
                    warn!(session = name, %err, "unarchive failed");
                    report.failed.push((name, err.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Diff of the work done between the recorded start and end commits.
    /// Empty when either commit is unknown.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session and
    /// `AppError::ExternalFailure` if the diff cannot be produced.
    pub async fn session_diff(&self, name: &str) -> Result<String> {
        let record = self.load_any(name)?;
        match (&record.start_commit_sha, &record.end_commit_sha) {
            (Some(from), Some(to)) => self.vcs.diff(&record.workspace, from, to).await,
            _ => Ok(String::new()),
        }
    }

    /// Load an active record, falling back to the archive.
    pub(crate) fn load_any(&self, name: &str) -> Result<SessionRecord> {
        match self.store.load(name) {
            Err(err) if err.is_not_found() => self.store.load_archived(name),
            other => other,
        }
    }

    async fn refresh(&self, record: SessionRecord) -> Result<SessionRecord> {
        if !record.status.is_live() || self.supervisor.is_running(&record).await {
            return Ok(record);
        }
        let _lock = self.store.lock(&record.name).await?;
        let mut fresh = self.store.load(&record.name)?;
        self.reconcile_if_stale(&mut fresh).await?;
        Ok(fresh)
    }

    /// Mark a live-looking record whose worker is gone as `Completed`.
    /// The caller must hold the record lock.
    async fn reconcile_if_stale(&self, record: &mut SessionRecord) -> Result<bool> {
        if !record.status.is_live() || self.supervisor.is_running(record).await {
            return Ok(false);
        }
        record.end_commit_sha = self.capture_commit(&record.workspace).await;
        record.transition(SessionStatus::Completed)?;
        self.store.save(record)?;
        self.audit(
            AuditEntry::new(AuditEventType::SessionReconcile)
                .with_session(&record.name)
                .with_result("worker not found; marked completed"),
        );
        info!(session = record.name, "stale session marked completed");
        Ok(true)
    }

    async fn capture_commit(&self, workspace: &Path) -> Option<String> {
        match self.vcs.current_commit(workspace).await {
            Ok(sha) if !sha.is_empty() => Some(sha),
            Ok(_) => None,
            Err(err) => {
                debug!(workspace = %workspace.display(), %err, "commit capture skipped");
                None
            }
        }
    }
}

fn resolve_workspace(workspace: &Path) -> Result<PathBuf> {
    let resolved = workspace.canonicalize().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("workspace {} does not exist", workspace.display()))
        } else {
            AppError::Io(format!(
                "failed to resolve workspace {}: {err}",
                workspace.display()
            ))
        }
    })?;
    if !resolved.is_dir() {
        return Err(AppError::InvalidArgument(format!(
            "workspace {} is not a directory",
            resolved.display()
        )));
    }
    Ok(resolved)
}
