//! Atomic file writing utility.
//!
//! Creates parent directories as needed and writes content via
//! `tempfile::NamedTempFile::persist()` so a concurrent reader never
//! observes a half-written file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{AppError, Result};

/// Summary of a completed file write operation.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Absolute path of the written file.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes_written: usize,
}

/// Write `content` to `target`, replacing any existing file atomically.
///
/// # Errors
///
/// Returns `AppError::Io` on directory creation, temp file write, sync, or
/// rename failure.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<WriteSummary> {
    let parent = target
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", target.display())))?;

    std::fs::create_dir_all(parent).map_err(|err| {
        AppError::Io(format!(
            "failed to create parent directories for {}: {err}",
            target.display()
        ))
    })?;

    // Same directory as the target so the rename never crosses filesystems.
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;

    tmp.write_all(content)
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| AppError::Io(format!("failed to sync temporary file: {err}")))?;

    tmp.persist(target).map_err(|err| {
        AppError::Io(format!(
            "failed to persist file to {}: {err}",
            target.display()
        ))
    })?;

    Ok(WriteSummary {
        path: target.to_path_buf(),
        bytes_written: content.len(),
    })
}

/// Serialize `value` as pretty JSON and write it atomically.
///
/// # Errors
///
/// Returns `AppError::Io` if serialization or the write fails.
pub fn write_json_atomic<T: serde::Serialize>(target: &Path, value: &T) -> Result<WriteSummary> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(target, &data)
}
