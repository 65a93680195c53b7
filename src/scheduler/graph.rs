//! In-memory task dependency graph.
//!
//! Nodes keep backlog insertion order; that order is the deterministic
//! tie-break for scheduling and the iteration order for every query.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::feature::Feature;
use crate::models::task::{TaskNode, TaskStatus};
use crate::{AppError, Result};

/// Count of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
    /// Tasks waiting on dependencies.
    pub pending: usize,
    /// Tasks whose dependencies are done.
    pub ready: usize,
    /// Tasks being worked on.
    pub in_progress: usize,
    /// Finished tasks.
    pub done: usize,
    /// Failed tasks.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnStack,
    Done,
}

/// Directed graph of tasks; an edge runs from a dependency to its dependent.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one node per backlog entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateId` if two entries resolve to the same id.
    pub fn load_from_features(features: &[Feature]) -> Result<Self> {
        let mut graph = Self::new();
        for feature in features {
            graph.add_node(TaskNode::from_feature(feature))?;
        }
        Ok(graph)
    }

    /// Append a node.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateId` if the id is already present.
    pub fn add_node(&mut self, node: TaskNode) -> Result<()> {
        if self.index.contains_key(&node.id) {
            return Err(AppError::DuplicateId(format!(
                "task id '{}' appears more than once",
                node.id
            )));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// Node by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Insertion index of a node.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// First dependency cycle found by depth-first search, as the ordered
    /// ids along the cycle (the closing node is not repeated). Empty when
    /// the graph is acyclic.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<String> {
        let mut state = vec![Visit::New; self.nodes.len()];
        let mut stack = Vec::new();
        for start in 0..self.nodes.len() {
            if state[start] == Visit::New {
                if let Some(cycle) = self.visit(start, &mut state, &mut stack) {
                    return cycle;
                }
            }
        }
        Vec::new()
    }

    fn visit(&self, at: usize, state: &mut [Visit], stack: &mut Vec<usize>) -> Option<Vec<String>> {
        state[at] = Visit::OnStack;
        stack.push(at);

        for dep in &self.nodes[at].dependencies {
            let Some(&next) = self.index.get(dep) else {
                continue;
            };
            match state[next] {
                Visit::New => {
                    if let Some(cycle) = self.visit(next, state, stack) {
                        return Some(cycle);
                    }
                }
                Visit::OnStack => {
                    let from = stack.iter().position(|&i| i == next).unwrap_or(0);
                    return Some(
                        stack[from..]
                            .iter()
                            .map(|&i| self.nodes[i].id.clone())
                            .collect(),
                    );
                }
                Visit::Done => {}
            }
        }

        stack.pop();
        state[at] = Visit::Done;
        None
    }

    /// `(task, missing dependency)` pairs whose dependency id has no node.
    #[must_use]
    pub fn orphaned_dependencies(&self) -> Vec<(String, String)> {
        let orphans: Vec<(String, String)> = self
            .nodes
            .iter()
            .flat_map(|node| {
                node.dependencies
                    .iter()
                    .filter(|dep| !self.index.contains_key(dep.as_str()))
                    .map(|dep| (node.id.clone(), dep.clone()))
            })
            .collect();
        for (task, dep) in &orphans {
            debug!(task, dependency = dep, "orphaned dependency");
        }
        orphans
    }

    /// Pending or ready tasks whose dependencies all exist and are done.
    #[must_use]
    pub fn ready_tasks(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.status, TaskStatus::Pending | TaskStatus::Ready))
            .filter(|node| {
                node.dependencies.iter().all(|dep| {
                    self.get(dep)
                        .is_some_and(|d| d.status == TaskStatus::Done)
                })
            })
            .map(|node| node.id.clone())
            .collect()
    }

    /// Set a task's status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id.
    pub fn mark_status(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        let i = self
            .index_of(id)
            .ok_or_else(|| AppError::NotFound(format!("task '{id}' not found")))?;
        self.nodes[i].status = status;
        Ok(())
    }

    /// Tally of tasks by status.
    #[must_use]
    pub fn summary(&self) -> TaskSummary {
        let mut summary = TaskSummary::default();
        for node in &self.nodes {
            match node.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Ready => summary.ready += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Done => summary.done += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Whether every task is done or failed.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| matches!(n.status, TaskStatus::Done | TaskStatus::Failed))
    }

    /// Indices of dependencies that resolve to nodes, each counted once.
    pub(crate) fn resolved_dependencies(&self, at: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.nodes[at]
            .dependencies
            .iter()
            .filter_map(|dep| self.index.get(dep).copied())
            .filter(|&i| seen.insert(i))
            .collect()
    }
}
