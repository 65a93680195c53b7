use agent_foreman::models::feature::{Feature, FeatureDependencies};
use agent_foreman::scheduler::mermaid::{render, sanitize_id};
use agent_foreman::scheduler::TaskGraph;

fn feature(id: &str, description: &str, status: &str, deps: &[&str]) -> Feature {
    Feature {
        id: id.into(),
        description: description.into(),
        status: status.into(),
        dependencies: FeatureDependencies {
            depends_on_ids: Some(deps.iter().map(|d| (*d).to_owned()).collect()),
            ..FeatureDependencies::default()
        },
        ..Feature::default()
    }
}

#[test]
fn renders_header_nodes_edges_and_classes() {
    let graph = TaskGraph::load_from_features(&[
        feature("feat-2", "Second", "in_progress", &["feat-1"]),
        feature("feat-1", "First", "done", &[]),
    ])
    .expect("graph");

    let out = render(&graph);

    assert!(out.starts_with("graph TD\n"));
    assert!(out.contains("    feat_1[\"First\"]:::done\n"));
    assert!(out.contains("    feat_2[\"Second\"]:::inprogress\n"));
    assert!(out.contains("    feat_1 --> feat_2\n"));
    for class in ["done", "inprogress", "failed", "ready", "pending"] {
        assert!(out.contains(&format!("classDef {class} ")), "missing {class}");
    }
}

#[test]
fn nodes_are_sorted_by_id() {
    let graph = TaskGraph::load_from_features(&[
        feature("zeta", "z", "", &[]),
        feature("alpha", "a", "", &[]),
    ])
    .expect("graph");

    let out = render(&graph);
    let alpha = out.find("alpha[").expect("alpha rendered");
    let zeta = out.find("zeta[").expect("zeta rendered");
    assert!(alpha < zeta);
}

#[test]
fn long_labels_are_truncated_and_quotes_replaced() {
    let graph = TaskGraph::load_from_features(&[feature(
        "t",
        "Add \"quoted\" support for a very long description here",
        "",
        &[],
    )])
    .expect("graph");

    let out = render(&graph);
    let line = out
        .lines()
        .find(|l| l.trim_start().starts_with("t["))
        .expect("node line");
    let label = line
        .split('"')
        .nth(1)
        .expect("quoted label");

    assert_eq!(label.chars().count(), 30);
    assert!(label.ends_with("..."));
    assert!(label.starts_with("Add 'quoted'"));
}

#[test]
fn sanitize_replaces_dashes_spaces_and_dots() {
    assert_eq!(sanitize_id("api-v1.2 beta"), "api_v1_2_beta");
}
