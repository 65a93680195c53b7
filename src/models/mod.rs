//! Domain model module declarations.

use std::sync::OnceLock;

use regex::Regex;

use crate::{AppError, Result};

pub mod feature;
pub mod session;
pub mod snapshot;
pub mod task;

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").ok())
        .as_ref()
}

/// Validate a session or snapshot name before it is used in a file path.
///
/// # Errors
///
/// Returns `AppError::InvalidArgument` if the name is empty, contains a path
/// separator or traversal segment, or uses characters outside `[A-Za-z0-9._-]`.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::InvalidArgument(format!("{kind} name cannot be empty")));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AppError::InvalidArgument(format!(
            "invalid {kind} name '{name}': path traversal characters detected"
        )));
    }
    let pattern = name_pattern()
        .ok_or_else(|| AppError::Config("name pattern failed to compile".into()))?;
    if !pattern.is_match(name) {
        return Err(AppError::InvalidArgument(format!(
            "invalid {kind} name '{name}': use letters, digits, '.', '_' or '-'"
        )));
    }
    Ok(())
}
