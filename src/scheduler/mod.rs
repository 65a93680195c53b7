//! Task graph construction, priority scheduling, and visualization.
//!
//! [`prioritize`] ties the pieces together: it rejects cyclic backlogs,
//! orders the rest with [`PriorityScheduler`], and rewrites the backlog in
//! that order without dropping any feature field.

pub mod graph;
pub mod mermaid;
pub mod priority;

use std::collections::HashMap;

use tracing::{info, info_span, warn, Instrument};

use crate::audit::{self, AuditEntry, AuditEventType, AuditLogger};
use crate::models::feature::FeatureList;
use crate::persistence::FeatureStore;
use crate::{AppError, Result};

pub use graph::{TaskGraph, TaskSummary};
pub use priority::PriorityScheduler;

/// Result of reordering a backlog.
#[derive(Debug, Clone)]
pub struct PrioritizeOutcome {
    /// Backlog in execution order.
    pub list: FeatureList,
    /// `(task, missing dependency)` pairs that were ignored.
    pub orphans: Vec<(String, String)>,
}

/// Reorder `list` so dependencies come first and higher tiers lead.
///
/// # Errors
///
/// - `AppError::DuplicateId` if two features share an id.
/// - `AppError::Unschedulable` if the backlog has a dependency cycle.
pub fn prioritize(mut list: FeatureList) -> Result<PrioritizeOutcome> {
    let graph = TaskGraph::load_from_features(&list.features)?;

    let cycle = graph.detect_cycles();
    if !cycle.is_empty() {
        return Err(AppError::Unschedulable(format!(
            "circular dependency detected: {}",
            cycle.join(" -> ")
        )));
    }

    let order = PriorityScheduler.schedule(&graph)?;
    let orphans = graph.orphaned_dependencies();

    let mut by_id: HashMap<String, _> = list
        .features
        .drain(..)
        .map(|f| (f.task_id(), f))
        .collect();
    list.features = order.iter().filter_map(|id| by_id.remove(id)).collect();

    Ok(PrioritizeOutcome { list, orphans })
}

/// Load a backlog from `store`, reorder it, and unless `dry_run` save it to
/// `output` (or back to `project_id`).
///
/// # Errors
///
/// Returns store errors, `AppError::Io` for malformed JSON, and the errors
/// of [`prioritize`].
pub async fn prioritize_plan(
    store: &dyn FeatureStore,
    project_id: &str,
    output: Option<&str>,
    dry_run: bool,
    audit_log: Option<&dyn AuditLogger>,
) -> Result<PrioritizeOutcome> {
    let span = info_span!("prioritize_plan", project_id, dry_run);
    async move {
        let raw = store.get_features(project_id).await?;
        let list = FeatureList::from_json(&raw)?;
        let outcome = prioritize(list)?;

        for (task, dep) in &outcome.orphans {
            warn!(task, dependency = dep, "dependency not in plan, ignored");
        }

        if dry_run {
            return Ok(outcome);
        }

        let target = output.unwrap_or(project_id);
        store.save_features(target, outcome.list.to_json()?).await?;
        audit::record(
            audit_log,
            AuditEntry::new(AuditEventType::PlanPrioritize)
                .with_target(target)
                .with_result(format!("{} features", outcome.list.features.len())),
        );
        info!(target, features = outcome.list.features.len(), "plan prioritized");
        Ok(outcome)
    }
    .instrument(span)
    .await
}
