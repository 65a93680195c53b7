//! Git-backed version control driven through its CLI.

use std::path::Path;

use tracing::debug;

use super::{run_cli, BoxFuture, VersionControl};
use crate::config::VcsConfig;
use crate::AppError;

/// [`VersionControl`] backed by the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
}

impl GitCli {
    /// Build a client from configuration.
    #[must_use]
    pub fn new(config: &VcsConfig) -> Self {
        Self {
            binary: config.binary.clone(),
        }
    }

    async fn run(&self, workspace: &Path, args: &[&str]) -> crate::Result<String> {
        debug!(workspace = %workspace.display(), ?args, "version control call");
        run_cli(&self.binary, args, Some(workspace))
            .await
            .map_err(AppError::ExternalFailure)
    }
}

impl VersionControl for GitCli {
    fn tag<'a>(&'a self, workspace: &'a Path, name: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.run(workspace, &["tag", name]).await.map(drop) })
    }

    fn delete_tag<'a>(&'a self, workspace: &'a Path, name: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match self.run(workspace, &["tag", "-d", name]).await {
                Ok(_) => Ok(()),
                Err(AppError::ExternalFailure(msg)) if msg.contains("not found") => {
                    Err(AppError::NotFound(format!("tag '{name}' not found")))
                }
                Err(err) => Err(err),
            }
        })
    }

    fn checkout<'a>(&'a self, workspace: &'a Path, reference: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.run(workspace, &["checkout", reference]).await.map(drop) })
    }

    fn diff<'a>(
        &'a self,
        workspace: &'a Path,
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, String> {
        Box::pin(async move { self.run(workspace, &["diff", from, to]).await })
    }

    fn log<'a>(&'a self, workspace: &'a Path, max_count: usize) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let count = format!("--max-count={max_count}");
            self.run(workspace, &["log", "--oneline", &count]).await
        })
    }

    fn current_commit<'a>(&'a self, workspace: &'a Path) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let sha = self.run(workspace, &["rev-parse", "HEAD"]).await?;
            Ok(sha.trim().to_owned())
        })
    }
}
