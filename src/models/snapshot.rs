//! Snapshot metadata model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state file captured by a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CapturedFile {
    /// File name inside the snapshot directory.
    pub stored_as: String,
    /// Live location the file was copied from and is restored to.
    pub source: PathBuf,
    /// SHA-256 of the captured bytes; `None` when the file did not exist.
    pub sha256: Option<String>,
}

impl CapturedFile {
    /// Whether the live file existed at capture time.
    #[must_use]
    pub fn was_present(&self) -> bool {
        self.sha256.is_some()
    }
}

/// Metadata persisted as `snapshots/<name>/meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Snapshot {
    /// Snapshot name; the version-control tag is `snapshot/<name>`.
    pub name: String,
    /// Operator-provided description.
    #[serde(default)]
    pub description: String,
    /// Capture timestamp.
    pub created_at: DateTime<Utc>,
    /// Session the state files belong to.
    pub session: String,
    /// Workspace the tag was recorded against.
    pub workspace: PathBuf,
    /// Workspace revision at capture time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Captured state files.
    #[serde(default)]
    pub files: Vec<CapturedFile>,
}

impl Snapshot {
    /// Version-control tag recorded for this snapshot.
    #[must_use]
    pub fn tag_name(&self) -> String {
        tag_for(&self.name)
    }
}

/// Version-control tag name for a snapshot.
#[must_use]
pub fn tag_for(snapshot_name: &str) -> String {
    format!("snapshot/{snapshot_name}")
}
