//! File-backed session store.
//!
//! Layout under the sessions directory:
//! - `<name>.json` / `<name>.log` for active records
//! - `archived/<name>.json` / `archived/<name>.log` for archived records
//! - `.locks/<name>.lock` advisory locks
//!
//! Every record write goes through [`write_json_atomic`], so readers only
//! ever see a complete record.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::atomic::write_json_atomic;
use super::lock::RecordLock;
use crate::models::session::SessionRecord;
use crate::models::validate_name;
use crate::{AppError, Result};

/// Durable store of session records, one JSON file per session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
    archived_dir: PathBuf,
}

impl SessionStore {
    /// Open (creating if needed) a store rooted at `sessions_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directories cannot be created.
    pub fn open(sessions_dir: impl Into<PathBuf>) -> Result<Self> {
        let sessions_dir = sessions_dir.into();
        let archived_dir = sessions_dir.join("archived");
        for dir in [&sessions_dir, &archived_dir] {
            fs::create_dir_all(dir).map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", dir.display()))
            })?;
        }
        Ok(Self {
            sessions_dir,
            archived_dir,
        })
    }

    /// Root directory of active records.
    #[must_use]
    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Directory of archived records.
    #[must_use]
    pub fn archived_dir(&self) -> &Path {
        &self.archived_dir
    }

    /// Path of the active record file for `name`.
    #[must_use]
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.sessions_dir.join(format!("{name}.json"))
    }

    /// Deterministic log path for `name`.
    #[must_use]
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.sessions_dir.join(format!("{name}.log"))
    }

    fn archived_record_path(&self, name: &str) -> PathBuf {
        self.archived_dir.join(format!("{name}.json"))
    }

    fn archived_log_path(&self, name: &str) -> PathBuf {
        self.archived_dir.join(format!("{name}.log"))
    }

    /// Lock file guarding `name`.
    #[must_use]
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.sessions_dir.join(".locks").join(format!("{name}.lock"))
    }

    /// Take the exclusive advisory lock for `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidArgument` for a bad name or `AppError::Io`
    /// if locking fails.
    pub async fn lock(&self, name: &str) -> Result<RecordLock> {
        validate_name("session", name)?;
        RecordLock::acquire_async(self.lock_path(name)).await
    }

    /// Whether an active record named `name` exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).is_file()
    }

    /// Whether an archived record named `name` exists.
    #[must_use]
    pub fn archived_exists(&self, name: &str) -> bool {
        self.archived_record_path(name).is_file()
    }

    /// Write or replace the active record atomically.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidArgument` for a bad name or `AppError::Io`
    /// if the write fails.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        validate_name("session", &record.name)?;
        let summary = write_json_atomic(&self.record_path(&record.name), record)?;
        debug!(
            session = record.name,
            status = %record.status,
            bytes = summary.bytes_written,
            "session record saved"
        );
        Ok(())
    }

    /// Load an active record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no active record exists.
    pub fn load(&self, name: &str) -> Result<SessionRecord> {
        validate_name("session", name)?;
        read_record(&self.record_path(name), name)
    }

    /// Load an archived record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no archived record exists.
    pub fn load_archived(&self, name: &str) -> Result<SessionRecord> {
        validate_name("session", name)?;
        read_record(&self.archived_record_path(name), name)
    }

    /// All active records, sorted by name. Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be scanned.
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        list_records(&self.sessions_dir)
    }

    /// All archived records, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be scanned.
    pub fn list_archived(&self) -> Result<Vec<SessionRecord>> {
        list_records(&self.archived_dir)
    }

    /// Delete an active record, its log and its lock file.
    ///
    /// The caller must hold the record lock from [`Self::lock`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the record is absent, `AppError::Io`
    /// if a file cannot be removed.
    pub fn remove(&self, name: &str) -> Result<()> {
        let record = self.load(name)?;

        remove_if_present(&self.record_path(name))?;
        remove_if_present(&record.log_file)?;
        let derived = self.log_path(name);
        if derived != record.log_file {
            remove_if_present(&derived)?;
        }
        remove_if_present(&self.lock_path(name))
    }

    /// Move a record and its log into the archive area.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if there is no active record,
    /// `AppError::AlreadyExists` if the archive already holds `name`.
    pub fn archive(&self, name: &str) -> Result<()> {
        validate_name("session", name)?;
        if !self.exists(name) {
            return Err(AppError::NotFound(format!("session '{name}' not found")));
        }
        if self.archived_exists(name) {
            return Err(AppError::AlreadyExists(format!(
                "an archived session named '{name}' already exists"
            )));
        }
        let record = self.load(name)?;
        relocate(
            (&self.record_path(name), &self.archived_record_path(name)),
            (&self.log_path(name), &self.archived_log_path(name)),
        )?;
        retarget_log(
            record,
            &self.log_path(name),
            &self.archived_log_path(name),
            &self.archived_record_path(name),
        )
    }

    /// Move a record and its log back from the archive area.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if there is no archived record,
    /// `AppError::AlreadyExists` if an active record holds `name`.
    pub fn unarchive(&self, name: &str) -> Result<()> {
        validate_name("session", name)?;
        if !self.archived_exists(name) {
            return Err(AppError::NotFound(format!(
                "archived session '{name}' not found"
            )));
        }
        if self.exists(name) {
            return Err(AppError::AlreadyExists(format!(
                "an active session named '{name}' already exists"
            )));
        }
        let record = self.load_archived(name)?;
        relocate(
            (&self.archived_record_path(name), &self.record_path(name)),
            (&self.archived_log_path(name), &self.log_path(name)),
        )?;
        retarget_log(
            record,
            &self.archived_log_path(name),
            &self.log_path(name),
            &self.record_path(name),
        )
    }
}

fn read_record(path: &Path, name: &str) -> Result<SessionRecord> {
    let data = fs::read(path).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            AppError::NotFound(format!("session '{name}' not found"))
        } else {
            AppError::Io(format!("failed to read session file: {err}"))
        }
    })?;
    serde_json::from_slice(&data)
        .map_err(|err| AppError::Io(format!("failed to parse session file {}: {err}", path.display())))
}

fn list_records(dir: &Path) -> Result<Vec<SessionRecord>> {
    let pattern = dir.join("*.json");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| AppError::Io(format!("{} is not valid UTF-8", dir.display())))?;
    let paths = glob::glob(pattern)
        .map_err(|err| AppError::Io(format!("bad session glob pattern: {err}")))?;

    let mut records = Vec::new();
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                warn!(%err, "skipping unreadable session entry");
                continue;
            }
        };
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match read_record(&path, name) {
            Ok(record) => records.push(record),
            Err(err) => warn!(path = %path.display(), %err, "skipping invalid session file"),
        }
    }
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

/// Point a moved record at its moved log, when it used the derived location.
fn retarget_log(mut record: SessionRecord, from: &Path, to: &Path, record_path: &Path) -> Result<()> {
    if record.log_file.as_path() != from {
        return Ok(());
    }
    record.log_file = to.to_path_buf();
    write_json_atomic(record_path, &record)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(format!(
            "failed to remove {}: {err}",
            path.display()
        ))),
    }
}

/// Move the record file, then the log; roll the record back if the log move fails.
fn relocate(record: (&Path, &Path), log: (&Path, &Path)) -> Result<()> {
    fs::rename(record.0, record.1)
        .map_err(|err| AppError::Io(format!("failed to move session record: {err}")))?;

    if log.0.exists() {
        if let Err(err) = fs::rename(log.0, log.1) {
            if let Err(rollback) = fs::rename(record.1, record.0) {
                warn!(%rollback, "failed to roll back session record move");
            }
            return Err(AppError::Io(format!("failed to move session log: {err}")));
        }
    }
    Ok(())
}
