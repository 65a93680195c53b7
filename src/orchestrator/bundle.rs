//! Export bundles: session artifacts gathered into one directory tree.
//!
//! Each exported session gets `<out>/<name>/` holding `metadata.json`,
//! `session.log`, and `work.diff`. Empty artifacts are not written, and a
//! missing log or a failing diff only produces a warning.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{SessionOrchestrator, Selection};
use crate::persistence::atomic::write_atomic;
use crate::Result;

/// Artifacts written for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSession {
    /// Session name.
    pub name: String,
    /// Directory holding the artifacts.
    pub dir: PathBuf,
    /// File names written, in order.
    pub files: Vec<String>,
}

impl SessionOrchestrator {
    /// Export the selected sessions' metadata, log, and diff under `out_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if a named session does not exist (active
    /// or archived) and `AppError::Io` if an artifact cannot be written.
    pub async fn export_bundle(
        &self,
        selection: &Selection,
        out_dir: &Path,
    ) -> Result<Vec<ExportedSession>> {
        let records = match selection {
            Selection::All => self.list_sessions().await?,
            Selection::Names(names) => names
                .iter()
                .map(|name| self.load_any(name))
                .collect::<Result<Vec<_>>>()?,
        };

        let mut exported = Vec::with_capacity(records.len());
        for record in records {
            let dir = out_dir.join(&record.name);
            let mut files = Vec::new();

            let metadata = serde_json::to_vec_pretty(&record)?;
            write_atomic(&dir.join("metadata.json"), &metadata)?;
            files.push("metadata.json".to_owned());

            match tokio::fs::read(&record.log_file).await {
                Ok(log) if !log.is_empty() => {
                    write_atomic(&dir.join("session.log"), &log)?;
                    files.push("session.log".to_owned());
                }
                Ok(_) => {}
                Err(err) => warn!(session = record.name, %err, "could not read session log"),
            }

            if let (Some(from), Some(to)) = (&record.start_commit_sha, &record.end_commit_sha) {
                match self.vcs.diff(&record.workspace, from, to).await {
                    Ok(diff) if !diff.is_empty() => {
                        write_atomic(&dir.join("work.diff"), diff.as_bytes())?;
                        files.push("work.diff".to_owned());
                    }
                    Ok(_) => {}
                    Err(err) => warn!(session = record.name, %err, "could not generate diff"),
                }
            }

            info!(session = record.name, dir = %dir.display(), "session exported");
            exported.push(ExportedSession {
                name: record.name,
                dir,
                files,
            });
        }
        Ok(exported)
    }
}
