//! Feature/plan store collaborator.
//!
//! The scheduler only needs `get_features` / `save_features`; the default
//! implementation keeps one JSON document per project id on disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::info;

use super::atomic::write_atomic;
use crate::{AppError, Result};

/// Source and sink for feature backlog documents.
pub trait FeatureStore: Send + Sync {
    /// Fetch the raw backlog JSON for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the project has no backlog, or
    /// `AppError::ExternalFailure` if the store cannot be reached.
    fn get_features(
        &self,
        project_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Replace the backlog JSON for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` or `AppError::Io` if the write fails.
    fn save_features(
        &self,
        project_id: &str,
        json: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Backlog store where the project id is a file path, optionally relative to `base`.
#[derive(Debug, Clone, Default)]
pub struct FileFeatureStore {
    base: Option<PathBuf>,
}

impl FileFeatureStore {
    /// Store resolving project ids relative to `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    /// Store treating project ids as paths relative to the working directory.
    #[must_use]
    pub fn cwd() -> Self {
        Self { base: None }
    }

    /// Resolve a project id to its backlog file.
    #[must_use]
    pub fn resolve(&self, project_id: &str) -> PathBuf {
        let path = Path::new(project_id);
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl FeatureStore for FileFeatureStore {
    fn get_features(
        &self,
        project_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let path = self.resolve(project_id);
        Box::pin(async move {
            tokio::fs::read_to_string(&path).await.map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    AppError::NotFound(format!("feature plan {} not found", path.display()))
                } else {
                    AppError::Io(format!("failed to read {}: {err}", path.display()))
                }
            })
        })
    }

    fn save_features(
        &self,
        project_id: &str,
        json: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let path = self.resolve(project_id);
        Box::pin(async move {
            let summary = tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
                .await
                .map_err(|err| AppError::Io(format!("feature write task failed: {err}")))??;
            info!(
                path = %summary.path.display(),
                bytes = summary.bytes_written,
                "feature plan saved"
            );
            Ok(())
        })
    }
}
