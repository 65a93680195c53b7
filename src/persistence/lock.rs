//! Per-record advisory locks.
//!
//! Each mutating lifecycle operation holds an exclusive lock on
//! `sessions/.locks/<name>.lock` so two invocations cannot interleave a
//! load-modify-save cycle on the same record. The lock is released when the
//! guard is dropped.
//!
//! Removing a record unlinks its lock file while the lock is held. A waiter
//! that was blocked on the unlinked file would then hold a lock nobody else
//! can see, so every acquisition checks that the path still names the file it
//! locked and retries on a fresh one otherwise.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Held exclusive lock on one record.
#[derive(Debug)]
pub struct RecordLock {
    file: File,
    path: PathBuf,
}

impl RecordLock {
    /// Block until the exclusive lock at `path` is acquired.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the lock file cannot be opened or locked.
    pub fn acquire(path: &Path) -> Result<Self> {
        loop {
            let file = open_lock_file(path)?;
            file.lock_exclusive().map_err(|err| {
                AppError::Io(format!("failed to lock {}: {err}", path.display()))
            })?;
            if !still_linked(&file, path) {
                debug!(lock = %path.display(), "lock file replaced while waiting, retrying");
                continue;
            }
            debug!(lock = %path.display(), "record lock acquired");
            return Ok(Self {
                file,
                path: path.to_path_buf(),
            });
        }
    }

    /// Acquire the lock without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the lock cannot be taken.
    pub async fn acquire_async(path: PathBuf) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::acquire(&path))
            .await
            .map_err(|err| AppError::Io(format!("lock task panicked: {err}")))?
    }

    /// Try to take the lock, returning `ResourceBusy` if another holder has it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ResourceBusy` when contended, `AppError::Io` otherwise.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            // Unlinked between open and lock: the record was removed, and the
            // next holder will recreate the file.
            Ok(()) if !still_linked(&file, path) => Self::try_acquire(path),
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Err(
                AppError::ResourceBusy(format!("{} is locked by another invocation", path.display())),
            ),
            Err(err) => Err(AppError::Io(format!(
                "failed to lock {}: {err}",
                path.display()
            ))),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(lock = %self.path.display(), %err, "failed to release record lock");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            AppError::Io(format!("failed to create lock directory: {err}"))
        })?;
    }
    // Never truncate: the file content is irrelevant, only the lock matters.
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|err| AppError::Io(format!("failed to open {}: {err}", path.display())))
}

/// Whether `path` still names the open `file`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

/// Lock files are never unlinked while open on hosts without inode identity.
#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}
