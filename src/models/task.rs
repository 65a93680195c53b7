//! Task graph node model.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::feature::Feature;

/// Execution status of a task. Informational; the scheduler ignores it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting on dependencies.
    Pending,
    /// All dependencies are done.
    Ready,
    /// Being worked on.
    InProgress,
    /// Finished successfully.
    Done,
    /// Finished unsuccessfully.
    Failed,
}

impl TaskStatus {
    /// Derive a status from a backlog entry's `passes` and `status` fields.
    #[must_use]
    pub fn from_feature(feature: &Feature) -> Self {
        let status = feature.status.to_ascii_lowercase();
        if feature.passes || status == "done" || status == "implemented" {
            return Self::Done;
        }
        match status.as_str() {
            "in_progress" => Self::InProgress,
            "failed" => Self::Failed,
            "ready" => Self::Ready,
            _ => Self::Pending,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse priority bucket. Ordering follows the numeric tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Unrecognized label.
    Unknown = 0,
    /// `POC`, `Low`, `Planning`.
    Low = 1,
    /// `MVP`, `Medium`, `Bug`.
    Medium = 2,
    /// `High`, `Critical`, `Production`.
    High = 3,
}

impl PriorityTier {
    /// Map a free-text priority label onto its tier, case-insensitively.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "production" | "high" => Self::High,
            "mvp" | "medium" | "bug" => Self::Medium,
            "poc" | "low" | "planning" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

/// One schedulable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TaskNode {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Original priority label.
    pub priority: String,
    /// Tier derived from `priority`.
    pub tier: PriorityTier,
    /// Ids this task depends on; may reference absent ids.
    pub dependencies: Vec<String>,
    /// Informational status.
    pub status: TaskStatus,
}

impl TaskNode {
    /// Build a node from a backlog entry.
    #[must_use]
    pub fn from_feature(feature: &Feature) -> Self {
        Self {
            id: feature.task_id(),
            name: feature.description.clone(),
            priority: feature.priority.clone(),
            tier: PriorityTier::from_label(&feature.priority),
            dependencies: feature.depends_on().to_vec(),
            status: TaskStatus::from_feature(feature),
        }
    }
}
