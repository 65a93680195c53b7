//! Priority scheduling and backlog reordering.

use agent_foreman::models::feature::{Feature, FeatureDependencies, FeatureList};
use agent_foreman::models::task::{PriorityTier, TaskNode, TaskStatus};
use agent_foreman::scheduler::{prioritize, PriorityScheduler, TaskGraph};
use agent_foreman::AppError;

fn feature(id: &str, priority: &str, deps: &[&str]) -> Feature {
    Feature {
        id: id.into(),
        priority: priority.into(),
        dependencies: FeatureDependencies {
            depends_on_ids: Some(deps.iter().map(|d| (*d).to_owned()).collect()),
            ..FeatureDependencies::default()
        },
        ..Feature::default()
    }
}

fn schedule(features: &[Feature]) -> Vec<String> {
    let graph = TaskGraph::load_from_features(features).expect("graph");
    PriorityScheduler.schedule(&graph).expect("schedulable")
}

#[test]
fn dependencies_override_priority() {
    let order = schedule(&[
        feature("F1", "MVP", &[]),
        feature("F2", "High", &["F1"]),
        feature("F3", "POC", &["F2"]),
    ]);
    assert_eq!(order, ["F1", "F2", "F3"]);
}

#[test]
fn higher_tier_goes_first_among_ready_tasks() {
    let order = schedule(&[
        feature("low", "POC", &[]),
        feature("mid", "MVP", &[]),
        feature("high", "Critical", &[]),
        feature("unknown", "whenever", &[]),
    ]);
    assert_eq!(order, ["high", "mid", "low", "unknown"]);
}

#[test]
fn equal_tiers_keep_backlog_order() {
    let order = schedule(&[
        feature("c", "High", &[]),
        feature("a", "High", &[]),
        feature("b", "High", &[]),
    ]);
    assert_eq!(order, ["c", "a", "b"]);
}

#[test]
fn high_tier_task_still_waits_for_its_dependency() {
    let order = schedule(&[
        feature("base", "Low", &[]),
        feature("filler", "Medium", &[]),
        feature("urgent", "High", &["base"]),
    ]);
    // `filler` outranks `base`; `urgent` only unlocks once `base` is done.
    assert_eq!(order, ["filler", "base", "urgent"]);
}

#[test]
fn unlocked_dependent_outranks_lower_tier_already_ready() {
    let order = schedule(&[
        feature("F1", "High", &[]),
        feature("F2", "MVP", &["F1"]),
        feature("F3", "Low", &[]),
    ]);
    // F3 was ready from the start, but F2 joins the ready set at a higher tier.
    assert_eq!(order, ["F1", "F2", "F3"]);
}

#[test]
fn orphaned_dependencies_are_ignored() {
    let order = schedule(&[feature("a", "Low", &["ghost"]), feature("b", "High", &[])]);
    assert_eq!(order, ["b", "a"]);
}

#[test]
fn every_dependency_precedes_its_dependent() {
    let features = [
        feature("deploy", "High", &["build", "test"]),
        feature("test", "Medium", &["build"]),
        feature("docs", "Low", &[]),
        feature("build", "Low", &[]),
    ];
    let order = schedule(&features);
    let pos = |id: &str| order.iter().position(|x| x == id).expect("scheduled");

    assert_eq!(order.len(), features.len());
    assert!(pos("build") < pos("test"));
    assert!(pos("test") < pos("deploy"));
}

#[test]
fn residual_cycle_is_unschedulable() {
    let mut graph = TaskGraph::new();
    for (id, dep) in [("x", "y"), ("y", "x")] {
        graph
            .add_node(TaskNode {
                id: id.into(),
                name: id.into(),
                priority: "High".into(),
                tier: PriorityTier::High,
                dependencies: vec![dep.into()],
                status: TaskStatus::Pending,
            })
            .expect("add");
    }
    let err = PriorityScheduler.schedule(&graph).expect_err("cycle");
    assert!(matches!(err, AppError::Unschedulable(_)));
    assert!(err.to_string().contains('x'));
}

#[test]
fn prioritize_reorders_and_keeps_fields() {
    let mut f3 = feature("F3", "POC", &["F2"]);
    f3.extra
        .insert("notes".into(), serde_json::json!("keep me"));
    let list = FeatureList {
        project_name: "demo".into(),
        features: vec![f3, feature("F2", "High", &["F1"]), feature("F1", "MVP", &[])],
        ..FeatureList::default()
    };

    let outcome = prioritize(list).expect("prioritized");
    let ids: Vec<&str> = outcome.list.features.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["F1", "F2", "F3"]);
    assert_eq!(outcome.list.project_name, "demo");
    assert_eq!(
        outcome.list.features[2].extra.get("notes"),
        Some(&serde_json::json!("keep me"))
    );
    assert!(outcome.orphans.is_empty());
}

#[test]
fn prioritize_rejects_cycles_with_path() {
    let list = FeatureList {
        features: vec![feature("A", "High", &["B"]), feature("B", "High", &["A"])],
        ..FeatureList::default()
    };
    let err = prioritize(list).expect_err("cycle");
    assert!(matches!(err, AppError::Unschedulable(_)));
    assert!(err.to_string().contains("circular dependency detected"));
}

#[test]
fn prioritize_reports_orphans() {
    let list = FeatureList {
        features: vec![feature("A", "High", &["missing"])],
        ..FeatureList::default()
    };
    let outcome = prioritize(list).expect("prioritized");
    assert_eq!(
        outcome.orphans,
        vec![("A".to_owned(), "missing".to_owned())]
    );
}
