//! Snapshot capture and restore for session state files.
//!
//! A snapshot copies a session's mutable state files into
//! `snapshots/<name>/`, records their SHA-256 hashes in `meta.json`, and tags
//! the workspace revision as `snapshot/<name>`. Restore copies the files back
//! byte-for-byte; it never moves the workspace's checkout.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::audit::{self, AuditEntry, AuditEventType, AuditLogger};
use crate::config::GlobalConfig;
use crate::driver::VersionControl;
use crate::models::session::SessionRecord;
use crate::models::snapshot::{tag_for, CapturedFile, Snapshot};
use crate::models::validate_name;
use crate::persistence::atomic::{write_atomic, write_json_atomic};
use crate::persistence::SessionStore;
use crate::{AppError, Result};

const META_FILE: &str = "meta.json";

/// Creates, lists, restores, and deletes snapshots.
pub struct SnapshotManager {
    root: PathBuf,
    store: SessionStore,
    vcs: Arc<dyn VersionControl>,
    state_files: Vec<String>,
    audit: Option<Arc<dyn AuditLogger>>,
}

impl SnapshotManager {
    /// Manager storing snapshots under `root`.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        store: SessionStore,
        vcs: Arc<dyn VersionControl>,
        state_files: Vec<String>,
    ) -> Self {
        Self {
            root: root.into(),
            store,
            vcs,
            state_files,
            audit: None,
        }
    }

    /// Manager rooted at the configured snapshots directory.
    #[must_use]
    pub fn from_config(
        config: &GlobalConfig,
        store: SessionStore,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self::new(
            config.snapshots_dir(),
            store,
            vcs,
            config.snapshot.state_files.clone(),
        )
    }

    /// Attach an audit logger.
    #[must_use]
    pub fn with_audit(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    fn snapshot_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Capture `session`'s state files under `name`.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyExists` if the snapshot exists.
    /// - `AppError::NotFound` if the session is unknown.
    /// - `AppError::ExternalFailure` if tagging fails; nothing is left behind.
    pub async fn save(&self, name: &str, session: &str, description: &str) -> Result<Snapshot> {
        let span = info_span!("snapshot_save", name, session);
        async move {
            validate_name("snapshot", name)?;
            let record = match self.store.load(session) {
                Err(err) if err.is_not_found() => self.store.load_archived(session)?,
                other => other?,
            };

            let dir = self.snapshot_dir(name);
            if dir.exists() {
                return Err(AppError::AlreadyExists(format!(
                    "snapshot '{name}' already exists"
                )));
            }
            std::fs::create_dir_all(&dir).map_err(|err| {
                AppError::Io(format!("failed to create snapshot directory: {err}"))
            })?;

            match self.capture(name, &record, description, &dir).await {
                Ok(snapshot) => {
                    audit::record(
                        self.audit.as_deref(),
                        AuditEntry::new(AuditEventType::SnapshotSave)
                            .with_session(session)
                            .with_target(name),
                    );
                    info!(files = snapshot.files.len(), "snapshot saved");
                    Ok(snapshot)
                }
                Err(err) => {
                    if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                        warn!(%cleanup, "failed to remove partial snapshot");
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn capture(
        &self,
        name: &str,
        record: &SessionRecord,
        description: &str,
        dir: &Path,
    ) -> Result<Snapshot> {
        let mut files = Vec::new();
        for source in self.state_sources(record) {
            let stored_as = stored_name(&source, &record.workspace);
            let captured = match std::fs::read(&source) {
                Ok(bytes) => {
                    write_atomic(&dir.join(&stored_as), &bytes)?;
                    CapturedFile {
                        stored_as,
                        source,
                        sha256: Some(sha256_hex(&bytes)),
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(source = %source.display(), "state file absent at capture");
                    CapturedFile {
                        stored_as,
                        source,
                        sha256: None,
                    }
                }
                Err(err) => {
                    return Err(AppError::Io(format!(
                        "failed to read {}: {err}",
                        source.display()
                    )))
                }
            };
            files.push(captured);
        }

        let commit_sha = match self.vcs.current_commit(&record.workspace).await {
            Ok(sha) if !sha.is_empty() => Some(sha),
            Ok(_) => None,
            Err(err) => {
                debug!(%err, "no commit recorded for snapshot");
                None
            }
        };

        let snapshot = Snapshot {
            name: name.to_owned(),
            description: description.to_owned(),
            created_at: Utc::now(),
            session: record.name.clone(),
            workspace: record.workspace.clone(),
            commit_sha,
            files,
        };
        write_json_atomic(&dir.join(META_FILE), &snapshot)?;

        self.vcs
            .tag(&record.workspace, &snapshot.tag_name())
            .await
            .map_err(|err| match err {
                AppError::ExternalFailure(msg) => {
                    AppError::ExternalFailure(format!("failed to tag snapshot: {msg}"))
                }
                other => other,
            })?;

        Ok(snapshot)
    }

    /// Agent state file plus configured workspace-relative state files, deduplicated.
    fn state_sources(&self, record: &SessionRecord) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        std::iter::once(record.agent_state_file.clone())
            .chain(self.state_files.iter().map(|f| record.workspace.join(f)))
            .filter(|p| seen.insert(p.clone()))
            .collect()
    }

    /// Read one snapshot's metadata.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the snapshot does not exist.
    pub fn load(&self, name: &str) -> Result<Snapshot> {
        validate_name("snapshot", name)?;
        let path = self.snapshot_dir(name).join(META_FILE);
        let raw = std::fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("snapshot '{name}' not found"))
            } else {
                AppError::Io(format!("failed to read snapshot metadata: {err}"))
            }
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// All snapshots, newest first. Directories without valid metadata are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the snapshots directory cannot be read.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(AppError::Io(format!("failed to read snapshots: {err}"))),
        };

        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path().join(META_FILE);
            let Ok(raw) = std::fs::read(&path) else {
                continue;
            };
            match serde_json::from_slice::<Snapshot>(&raw) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => warn!(path = %path.display(), %err, "skipping invalid snapshot"),
            }
        }
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }

    /// Copy captured files back over the live state files.
    ///
    /// Every stored file is verified against its recorded hash before any
    /// live file is touched. Files absent at capture time are removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the snapshot does not exist and
    /// `AppError::Io` if a stored file is missing or corrupted.
    pub async fn restore(&self, name: &str) -> Result<Snapshot> {
        let span = info_span!("snapshot_restore", name);
        async move {
            let snapshot = self.load(name)?;
            let dir = self.snapshot_dir(name);

            let mut payloads = Vec::with_capacity(snapshot.files.len());
            for file in &snapshot.files {
                let Some(expected) = &file.sha256 else {
                    payloads.push((file, None));
                    continue;
                };
                let bytes = std::fs::read(dir.join(&file.stored_as)).map_err(|err| {
                    AppError::Io(format!(
                        "snapshot '{name}' is missing {}: {err}",
                        file.stored_as
                    ))
                })?;
                if sha256_hex(&bytes) != *expected {
                    return Err(AppError::Io(format!(
                        "snapshot '{name}' file {} failed checksum verification",
                        file.stored_as
                    )));
                }
                payloads.push((file, Some(bytes)));
            }

            for (file, bytes) in payloads {
                match bytes {
                    Some(bytes) => {
                        write_atomic(&file.source, &bytes)?;
                    }
                    None => match std::fs::remove_file(&file.source) {
                        Ok(()) => debug!(path = %file.source.display(), "removed file absent at capture"),
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                        Err(err) => {
                            return Err(AppError::Io(format!(
                                "failed to remove {}: {err}",
                                file.source.display()
                            )))
                        }
                    },
                }
            }

            audit::record(
                self.audit.as_deref(),
                AuditEntry::new(AuditEventType::SnapshotRestore)
                    .with_session(&snapshot.session)
                    .with_target(name),
            );
            info!(files = snapshot.files.len(), "snapshot restored");
            Ok(snapshot)
        }
        .instrument(span)
        .await
    }

    /// Remove a snapshot and its tag. A missing tag is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the snapshot directory does not exist.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let span = info_span!("snapshot_delete", name);
        async move {
            validate_name("snapshot", name)?;
            let dir = self.snapshot_dir(name);
            if !dir.is_dir() {
                return Err(AppError::NotFound(format!("snapshot '{name}' not found")));
            }

            match self.load(name) {
                Ok(snapshot) => {
                    match self.vcs.delete_tag(&snapshot.workspace, &tag_for(name)).await {
                        Ok(()) => debug!("snapshot tag deleted"),
                        Err(err) if err.is_not_found() => debug!("snapshot tag already gone"),
                        Err(err) => warn!(%err, "failed to delete snapshot tag"),
                    }
                }
                Err(err) => warn!(%err, "snapshot metadata unreadable, skipping tag deletion"),
            }

            std::fs::remove_dir_all(&dir)
                .map_err(|err| AppError::Io(format!("failed to remove snapshot: {err}")))?;

            audit::record(
                self.audit.as_deref(),
                AuditEntry::new(AuditEventType::SnapshotDelete).with_target(name),
            );
            info!("snapshot deleted");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// File name inside the snapshot directory for a captured source path.
fn stored_name(source: &Path, workspace: &Path) -> String {
    match source.strip_prefix(workspace) {
        Ok(rel) => rel.to_string_lossy().replace(['/', '\\'], "__"),
        Err(_) => source
            .file_name()
            .map_or_else(|| "state".to_owned(), |n| n.to_string_lossy().into_owned()),
    }
}

/// Compute SHA-256 hex digest of the given bytes.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
