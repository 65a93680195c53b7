//! Global configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Container runtime settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ContainerConfig {
    /// Runtime CLI binary (e.g., `docker`, `podman`).
    #[serde(default = "default_container_binary")]
    pub binary: String,
    /// Whether the runtime can freeze containers with `pause`/`unpause`.
    #[serde(default = "default_true")]
    pub pause_supported: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            binary: default_container_binary(),
            pause_supported: true,
        }
    }
}

/// Version-control settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct VcsConfig {
    /// Version-control CLI binary.
    #[serde(default = "default_vcs_binary")]
    pub binary: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            binary: default_vcs_binary(),
        }
    }
}

/// Safe-deletion allowlist used by `prune`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PruneConfig {
    /// Directory-name prefix marking a workspace created for an agent.
    #[serde(default = "default_workspace_prefix")]
    pub workspace_prefix: String,
    /// Path component marking a foreman state directory.
    #[serde(default = "default_state_marker")]
    pub state_marker: String,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            workspace_prefix: default_workspace_prefix(),
            state_marker: default_state_marker(),
        }
    }
}

/// Snapshot capture settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    /// Workspace-relative state files captured in addition to the agent state file.
    #[serde(default = "default_state_files")]
    pub state_files: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            state_files: default_state_files(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_container_binary() -> String {
    "docker".into()
}

fn default_vcs_binary() -> String {
    "git".into()
}

fn default_workspace_prefix() -> String {
    "foreman-agent-".into()
}

fn default_state_marker() -> String {
    ".foreman".into()
}

fn default_state_files() -> Vec<String> {
    vec![".agent_state.json".into(), ".foreman.db".into()]
}

fn default_stop_grace_ms() -> u64 {
    2000
}

fn default_log_poll_interval_ms() -> u64 {
    250
}

fn default_state_root() -> PathBuf {
    if let Some(home) = env::var_os("FOREMAN_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    match env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => PathBuf::from(home).join(".foreman"),
        None => {
            warn!("HOME is not set, keeping foreman state under the temp directory");
            env::temp_dir().join(".foreman")
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Per-operator root holding `sessions/`, `snapshots/`, and `audit/`.
    #[serde(default = "default_state_root")]
    pub state_root: PathBuf,
    /// Grace period between the termination request and a forced kill.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Poll interval for follow-mode log reads; must be sub-second.
    #[serde(default = "default_log_poll_interval_ms")]
    pub log_poll_interval_ms: u64,
    /// Container runtime settings.
    #[serde(default)]
    pub container: ContainerConfig,
    /// Version-control settings.
    #[serde(default)]
    pub vcs: VcsConfig,
    /// Prune safety allowlist.
    #[serde(default)]
    pub prune: PruneConfig,
    /// Snapshot capture settings.
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            state_root: default_state_root(),
            stop_grace_ms: default_stop_grace_ms(),
            log_poll_interval_ms: default_log_poll_interval_ms(),
            container: ContainerConfig::default(),
            vcs: VcsConfig::default(),
            prune: PruneConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Directory holding active session records and logs.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.state_root.join("sessions")
    }

    /// Directory holding snapshot captures.
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.state_root.join("snapshots")
    }

    /// Directory holding the JSONL audit trail.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.state_root.join("audit")
    }

    /// Grace period granted to a worker between termination request and kill.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Poll interval used by follow-mode log readers.
    #[must_use]
    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }

    /// Validate field ranges.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.log_poll_interval_ms == 0 || self.log_poll_interval_ms >= 1000 {
            return Err(AppError::Config(
                "log_poll_interval_ms must be between 1 and 999".into(),
            ));
        }

        if self.container.binary.trim().is_empty() {
            return Err(AppError::Config("container.binary must not be empty".into()));
        }

        if self.vcs.binary.trim().is_empty() {
            return Err(AppError::Config("vcs.binary must not be empty".into()));
        }

        if self.prune.workspace_prefix.is_empty() || self.prune.state_marker.is_empty() {
            return Err(AppError::Config(
                "prune allowlist markers must not be empty".into(),
            ));
        }

        Ok(())
    }
}
