//! Feature backlog document as exchanged with the feature store.

use serde::{Deserialize, Serialize};

/// Dependency block attached to a feature.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FeatureDependencies {
    /// Ids of features that must complete first.
    #[serde(default)]
    pub depends_on_ids: Option<Vec<String>>,
    /// Paths this feature writes exclusively.
    #[serde(default)]
    pub exclusive_write_paths: Option<Vec<String>>,
    /// Paths this feature only reads.
    #[serde(default)]
    pub read_only_paths: Option<Vec<String>>,
}

/// One backlog entry. Unknown fields survive a load/save cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Feature {
    /// Unique id within the backlog.
    #[serde(default)]
    pub id: String,
    /// Grouping label; used to derive an id when `id` is empty.
    #[serde(default)]
    pub category: String,
    /// Free-text priority label (`High`, `MVP`, `POC`, ...).
    #[serde(default)]
    pub priority: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Free-text workflow status (`pending`, `in_progress`, `done`, ...).
    #[serde(default)]
    pub status: String,
    /// Whether acceptance checks pass.
    #[serde(default)]
    pub passes: bool,
    /// Dependency metadata.
    #[serde(default)]
    pub dependencies: FeatureDependencies,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Feature {
    /// Dependency ids, empty when none are declared.
    #[must_use]
    pub fn depends_on(&self) -> &[String] {
        self.dependencies.depends_on_ids.as_deref().unwrap_or_default()
    }

    /// Id used for graph nodes; falls back to `task-<category>`.
    #[must_use]
    pub fn task_id(&self) -> String {
        if self.id.is_empty() {
            format!("task-{}", self.category)
        } else {
            self.id.clone()
        }
    }
}

/// Whole backlog document (`feature_list.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FeatureList {
    /// Project label.
    #[serde(default)]
    pub project_name: String,
    /// Ordered backlog.
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FeatureList {
    /// Parse a backlog document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the text is not a valid backlog document.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Render the backlog as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
