//! Priority-aware topological ordering (Kahn's algorithm with a max-heap).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use super::graph::TaskGraph;
use crate::models::task::PriorityTier;
use crate::{AppError, Result};

/// Orders a [`TaskGraph`] so every dependency precedes its dependents and,
/// among simultaneously ready tasks, the higher tier goes first. Equal tiers
/// keep backlog order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityScheduler;

impl PriorityScheduler {
    /// Compute the execution order as task ids.
    ///
    /// Dependencies on ids absent from the graph are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unschedulable` if some tasks never become ready
    /// (a residual cycle).
    pub fn schedule(&self, graph: &TaskGraph) -> Result<Vec<String>> {
        let nodes = graph.nodes();
        let mut in_degree = vec![0usize; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

        for at in 0..nodes.len() {
            for dep in graph.resolved_dependencies(at) {
                dependents[dep].push(at);
                in_degree[at] += 1;
            }
        }
        let orphans = graph.orphaned_dependencies().len();
        if orphans > 0 {
            debug!(orphans, "orphaned dependencies dropped from scheduling");
        }

        // Max-heap on tier; Reverse(index) makes earlier backlog entries win ties.
        let mut ready: BinaryHeap<(PriorityTier, Reverse<usize>)> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(i, _)| (nodes[i].tier, Reverse(i)))
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while let Some((_, Reverse(at))) = ready.pop() {
            order.push(nodes[at].id.clone());
            for &next in &dependents[at] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push((nodes[next].tier, Reverse(next)));
                }
            }
        }

        if order.len() < nodes.len() {
            let stuck: Vec<&str> = nodes
                .iter()
                .zip(&in_degree)
                .filter(|&(_, &deg)| deg > 0)
                .map(|(n, _)| n.id.as_str())
                .collect();
            return Err(AppError::Unschedulable(format!(
                "{} of {} tasks are blocked by a dependency cycle: {}",
                stuck.len(),
                nodes.len(),
                stuck.join(", ")
            )));
        }
        Ok(order)
    }
}
