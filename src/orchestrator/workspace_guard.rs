//! Safe-deletion allowlist for workspace directories.
//!
//! `prune` removes workspaces recursively, so a misconfigured `workspace`
//! field must never lead it to an unrelated directory. A path is deletable
//! only if it is absolute, free of `.`/`..` segments, not a filesystem root,
//! and matches one of:
//! - its final component starts with the agent workspace prefix,
//! - one of its components contains the foreman state marker,
//! - it lives strictly below the system temp directory.

use std::path::{Component, Path, PathBuf};

use crate::config::PruneConfig;

/// Decides which workspace directories prune may delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceGuard {
    workspace_prefix: String,
    state_marker: String,
    temp_root: PathBuf,
}

impl WorkspaceGuard {
    /// Allowlist from configuration, rooted at the system temp directory.
    #[must_use]
    pub fn from_config(config: &PruneConfig) -> Self {
        Self {
            workspace_prefix: config.workspace_prefix.clone(),
            state_marker: config.state_marker.clone(),
            temp_root: std::env::temp_dir(),
        }
    }

    /// Use `root` in place of the system temp directory.
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    /// Whether `path` may be removed recursively.
    #[must_use]
    pub fn is_safe_to_delete(&self, path: &Path) -> bool {
        if !path.is_absolute() {
            return false;
        }
        let mut normal_parts = 0usize;
        for component in path.components() {
            match component {
                Component::ParentDir | Component::CurDir => return false,
                Component::Normal(_) => normal_parts += 1,
                Component::RootDir | Component::Prefix(_) => {}
            }
        }
        if normal_parts == 0 {
            return false;
        }

        let has_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&self.workspace_prefix));
        if has_prefix {
            return true;
        }

        let has_marker = path.components().any(|c| match c {
            Component::Normal(part) => part
                .to_str()
                .is_some_and(|p| p.contains(&self.state_marker)),
            _ => false,
        });
        if has_marker {
            return true;
        }

        self.is_under_temp_root(path)
    }

    fn is_under_temp_root(&self, path: &Path) -> bool {
        let roots = [
            Some(self.temp_root.clone()),
            self.temp_root.canonicalize().ok(),
        ];
        let candidates = [Some(path.to_path_buf()), path.canonicalize().ok()];
        roots.iter().flatten().any(|root| {
            candidates
                .iter()
                .flatten()
                .any(|p| p != root && p.starts_with(root))
        })
    }
}
