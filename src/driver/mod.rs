//! External collaborator capabilities.
//!
//! The orchestrator never talks to a container runtime or a version-control
//! system directly; it goes through [`ContainerRuntime`] and
//! [`VersionControl`]. The CLI-backed implementations live in [`docker`] and
//! [`git`]; tests substitute in-memory fakes.

pub mod docker;
pub mod git;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::Result;

pub use docker::DockerCli;
pub use git::GitCli;

/// Boxed future returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One row of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Container id.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Runtime-reported status text.
    pub status: String,
}

/// Container runtime capability set.
pub trait ContainerRuntime: Send + Sync {
    /// List containers matching a runtime filter expression (e.g., `name=foo`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the runtime call fails.
    fn list(&self, filter: Option<&str>) -> BoxFuture<'_, Vec<ContainerSummary>>;

    /// Start a created or stopped container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id, `AppError::ExternalFailure` otherwise.
    fn start(&self, id: &str) -> BoxFuture<'_, ()>;

    /// Stop a running container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id, `AppError::ExternalFailure` otherwise.
    fn stop(&self, id: &str) -> BoxFuture<'_, ()>;

    /// Freeze a running container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unsupported` if the runtime cannot pause containers.
    fn pause(&self, id: &str) -> BoxFuture<'_, ()>;

    /// Thaw a paused container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unsupported` if the runtime cannot pause containers.
    fn resume(&self, id: &str) -> BoxFuture<'_, ()>;

    /// Remove a container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the container is already gone.
    fn remove(&self, id: &str) -> BoxFuture<'_, ()>;

    /// Run `argv` inside a container and return its combined output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the command fails.
    fn exec(&self, id: &str, argv: &[String]) -> BoxFuture<'_, String>;

    /// Fetch container output, optionally limited to the last `lines`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the runtime call fails.
    fn logs(&self, id: &str, lines: Option<usize>) -> BoxFuture<'_, String>;

    /// Whether the container is currently running.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id.
    fn is_running(&self, id: &str) -> BoxFuture<'_, bool>;

    /// Argument vector of a long-lived process that follows container output
    /// produced from `since` onwards, if the runtime offers one. The supervisor
    /// pipes it into the session log, which already holds earlier output.
    fn follow_logs_argv(&self, _id: &str, _since: DateTime<Utc>) -> Option<Vec<String>> {
        None
    }
}

/// Version-control capability set.
pub trait VersionControl: Send + Sync {
    /// Tag the workspace's current revision.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if tagging fails.
    fn tag<'a>(&'a self, workspace: &'a Path, name: &'a str) -> BoxFuture<'a, ()>;

    /// Delete a tag.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the tag does not exist.
    fn delete_tag<'a>(&'a self, workspace: &'a Path, name: &'a str) -> BoxFuture<'a, ()>;

    /// Check out a revision.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the checkout fails.
    fn checkout<'a>(&'a self, workspace: &'a Path, reference: &'a str) -> BoxFuture<'a, ()>;

    /// Unified diff between two revisions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the diff fails.
    fn diff<'a>(&'a self, workspace: &'a Path, from: &'a str, to: &'a str)
        -> BoxFuture<'a, String>;

    /// One-line history, newest first, limited to `max_count` entries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the log call fails.
    fn log<'a>(&'a self, workspace: &'a Path, max_count: usize) -> BoxFuture<'a, String>;

    /// Revision the workspace currently points at.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the workspace is not a repository.
    fn current_commit<'a>(&'a self, workspace: &'a Path) -> BoxFuture<'a, String>;
}

/// Run a collaborator CLI and capture its stdout.
///
/// On a non-zero exit the error carries the trimmed stderr so callers can
/// classify well-known failures (missing container, missing tag).
pub(crate) async fn run_cli(
    binary: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> std::result::Result<String, String> {
    let mut cmd = tokio::process::Command::new(binary);
    cmd.args(args).stdin(std::process::Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| format!("failed to exec {binary}: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "{binary} {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        ))
    }
}
