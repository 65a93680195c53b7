//! JSONL audit trail, one file per UTC day.
//!
//! Every `foreman` invocation is a separate process, so several of them may
//! append to the same day file at once. Each entry is rendered to a single
//! line up front and written with one `write_all` while holding an exclusive
//! `flock` on the file, which keeps lines whole across processes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use fs2::FileExt;
use tracing::warn;

use super::{AuditEntry, AuditLogger};
use crate::{AppError, Result};

/// Appends audit entries to `<dir>/audit-YYYY-MM-DD.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlAuditWriter {
    dir: PathBuf,
}

impl JsonlAuditWriter {
    /// Writer rooted at `dir`, created with its parents if missing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create audit directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    /// Day file for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{date}.jsonl"))
    }

    fn append_line(&self, date: NaiveDate, line: &str) -> Result<()> {
        let path = self.path_for(date);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Io(format!("failed to open audit log {}: {e}", path.display())))?;

        file.lock_exclusive()
            .map_err(|e| AppError::Io(format!("failed to lock audit log: {e}")))?;
        let written = file.write_all(line.as_bytes()).and_then(|()| file.flush());
        if let Err(e) = FileExt::unlock(&file) {
            warn!(path = %path.display(), "failed to unlock audit log: {e}");
        }
        written.map_err(|e| AppError::Io(format!("audit write failed: {e}")))
    }
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.append_line(Utc::now().date_naive(), &line)
    }
}
