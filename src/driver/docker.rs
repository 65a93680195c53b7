//! Docker-compatible container runtime driven through its CLI.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use super::{run_cli, BoxFuture, ContainerRuntime, ContainerSummary};
use crate::config::ContainerConfig;
use crate::AppError;

/// [`ContainerRuntime`] backed by the `docker` (or compatible) CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    pause_supported: bool,
}

impl DockerCli {
    /// Build a runtime from configuration.
    #[must_use]
    pub fn new(config: &ContainerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            pause_supported: config.pause_supported,
        }
    }

    async fn run(&self, args: &[&str]) -> crate::Result<String> {
        debug!(binary = self.binary, ?args, "container runtime call");
        run_cli(&self.binary, args, None).await.map_err(classify)
    }
}

/// Map CLI failures onto the error taxonomy.
fn classify(message: String) -> AppError {
    if message.contains("No such container") || message.contains("no such container") {
        AppError::NotFound(message)
    } else {
        AppError::ExternalFailure(message)
    }
}

fn parse_listing(raw: &str) -> Vec<ContainerSummary> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.splitn(3, '\t');
            ContainerSummary {
                id: parts.next().unwrap_or_default().to_owned(),
                name: parts.next().unwrap_or_default().to_owned(),
                status: parts.next().unwrap_or_default().to_owned(),
            }
        })
        .collect()
}

impl ContainerRuntime for DockerCli {
    fn list(&self, filter: Option<&str>) -> BoxFuture<'_, Vec<ContainerSummary>> {
        let filter = filter.map(str::to_owned);
        Box::pin(async move {
            let mut args = vec!["ps", "-a", "--format", "{{.ID}}\t{{.Names}}\t{{.Status}}"];
            if let Some(ref f) = filter {
                args.push("--filter");
                args.push(f);
            }
            let raw = self.run(&args).await?;
            Ok(parse_listing(&raw))
        })
    }

    fn start(&self, id: &str) -> BoxFuture<'_, ()> {
        let id = id.to_owned();
        Box::pin(async move { self.run(&["start", &id]).await.map(drop) })
    }

    fn stop(&self, id: &str) -> BoxFuture<'_, ()> {
        let id = id.to_owned();
        Box::pin(async move { self.run(&["stop", &id]).await.map(drop) })
    }

    fn pause(&self, id: &str) -> BoxFuture<'_, ()> {
        let id = id.to_owned();
        Box::pin(async move {
            if !self.pause_supported {
                return Err(AppError::Unsupported(format!(
                    "{} cannot pause containers",
                    self.binary
                )));
            }
            self.run(&["pause", &id]).await.map(drop)
        })
    }

    fn resume(&self, id: &str) -> BoxFuture<'_, ()> {
        let id = id.to_owned();
        Box::pin(async move {
            if !self.pause_supported {
                return Err(AppError::Unsupported(format!(
                    "{} cannot unpause containers",
                    self.binary
                )));
            }
            self.run(&["unpause", &id]).await.map(drop)
        })
    }

    fn remove(&self, id: &str) -> BoxFuture<'_, ()> {
        let id = id.to_owned();
        Box::pin(async move { self.run(&["rm", "-f", &id]).await.map(drop) })
    }

    fn exec(&self, id: &str, argv: &[String]) -> BoxFuture<'_, String> {
        let id = id.to_owned();
        let argv = argv.to_vec();
        Box::pin(async move {
            let mut args = vec!["exec", id.as_str()];
            args.extend(argv.iter().map(String::as_str));
            self.run(&args).await
        })
    }

    fn logs(&self, id: &str, lines: Option<usize>) -> BoxFuture<'_, String> {
        let id = id.to_owned();
        Box::pin(async move {
            let tail = lines.map(|n| n.to_string());
            let mut args = vec!["logs"];
            if let Some(ref n) = tail {
                args.push("--tail");
                args.push(n);
            }
            args.push(&id);
            self.run(&args).await
        })
    }

    fn is_running(&self, id: &str) -> BoxFuture<'_, bool> {
        let id = id.to_owned();
        Box::pin(async move {
            let raw = self
                .run(&["inspect", "--format", "{{.State.Running}}", &id])
                .await?;
            Ok(raw.trim() == "true")
        })
    }

    fn follow_logs_argv(&self, id: &str, since: DateTime<Utc>) -> Option<Vec<String>> {
        Some(vec![
            self.binary.clone(),
            "logs".into(),
            "-f".into(),
            "--since".into(),
            since.to_rfc3339_opts(SecondsFormat::Nanos, true),
            id.to_owned(),
        ])
    }
}
