//! Mermaid flowchart rendering of a task graph.

use std::fmt::Write as _;

use super::graph::TaskGraph;
use crate::models::task::TaskStatus;

const MAX_LABEL_CHARS: usize = 30;

/// Render `graph` as a Mermaid `graph TD` flowchart, nodes sorted by id.
#[must_use]
pub fn render(graph: &TaskGraph) -> String {
    let mut nodes: Vec<_> = graph.nodes().iter().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = String::from("graph TD\n");
    for node in nodes {
        let id = sanitize_id(&node.id);
        let _ = writeln!(
            out,
            "    {id}[\"{}\"]:::{}",
            label(&node.name),
            class_for(node.status)
        );
        for dep in &node.dependencies {
            let _ = writeln!(out, "    {} --> {id}", sanitize_id(dep));
        }
    }

    out.push('\n');
    out.push_str("    classDef done fill:#90EE90,stroke:#333,stroke-width:2px,color:black;\n");
    out.push_str("    classDef inprogress fill:#87CEEB,stroke:#333,stroke-width:2px,color:black;\n");
    out.push_str("    classDef failed fill:#FF6347,stroke:#333,stroke-width:2px,color:black;\n");
    out.push_str("    classDef ready fill:#FFD700,stroke:#333,stroke-width:2px,color:black;\n");
    out.push_str("    classDef pending fill:#D3D3D3,stroke:#333,stroke-width:1px,color:black;\n");
    out
}

/// Mermaid node ids cannot contain `-`, spaces, or `.`.
#[must_use]
pub fn sanitize_id(id: &str) -> String {
    id.replace(['-', ' ', '.'], "_")
}

fn label(name: &str) -> String {
    let cleaned = name.replace('"', "'").replace('\n', " ");
    if cleaned.chars().count() > MAX_LABEL_CHARS {
        let head: String = cleaned.chars().take(MAX_LABEL_CHARS - 3).collect();
        format!("{head}...")
    } else {
        cleaned
    }
}

fn class_for(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Done => "done",
        TaskStatus::InProgress => "inprogress",
        TaskStatus::Failed => "failed",
        TaskStatus::Ready => "ready",
        TaskStatus::Pending => "pending",
    }
}
