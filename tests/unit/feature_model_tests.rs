//! Backlog document parsing and task derivation.

use agent_foreman::models::feature::{Feature, FeatureList};
use agent_foreman::models::task::{PriorityTier, TaskNode, TaskStatus};

fn feature(id: &str, status: &str, passes: bool) -> Feature {
    Feature {
        id: id.into(),
        status: status.into(),
        passes,
        ..Feature::default()
    }
}

#[test]
fn priority_labels_map_to_tiers() {
    for (label, tier) in [
        ("Critical", PriorityTier::High),
        ("production", PriorityTier::High),
        ("HIGH", PriorityTier::High),
        ("MVP", PriorityTier::Medium),
        ("medium", PriorityTier::Medium),
        ("Bug", PriorityTier::Medium),
        ("POC", PriorityTier::Low),
        ("low", PriorityTier::Low),
        ("Planning", PriorityTier::Low),
        ("someday", PriorityTier::Unknown),
        ("", PriorityTier::Unknown),
    ] {
        assert_eq!(PriorityTier::from_label(label), tier, "label {label:?}");
    }
}

#[test]
fn tiers_order_from_high_to_unknown() {
    assert!(PriorityTier::High > PriorityTier::Medium);
    assert!(PriorityTier::Medium > PriorityTier::Low);
    assert!(PriorityTier::Low > PriorityTier::Unknown);
}

#[test]
fn task_status_derives_from_passes_and_status() {
    assert_eq!(
        TaskStatus::from_feature(&feature("a", "pending", true)),
        TaskStatus::Done
    );
    assert_eq!(
        TaskStatus::from_feature(&feature("a", "implemented", false)),
        TaskStatus::Done
    );
    assert_eq!(
        TaskStatus::from_feature(&feature("a", "in_progress", false)),
        TaskStatus::InProgress
    );
    assert_eq!(
        TaskStatus::from_feature(&feature("a", "Failed", false)),
        TaskStatus::Failed
    );
    assert_eq!(
        TaskStatus::from_feature(&feature("a", "", false)),
        TaskStatus::Pending
    );
}

#[test]
fn empty_id_falls_back_to_category() {
    let feature = Feature {
        category: "auth".into(),
        ..Feature::default()
    };
    assert_eq!(feature.task_id(), "task-auth");
}

#[test]
fn task_node_carries_dependencies_and_tier() {
    let raw = r#"{
        "id": "F2",
        "priority": "MVP",
        "description": "login form",
        "dependencies": { "depends_on_ids": ["F1"] }
    }"#;
    let feature: Feature = serde_json::from_str(raw).expect("feature parses");
    let node = TaskNode::from_feature(&feature);

    assert_eq!(node.id, "F2");
    assert_eq!(node.name, "login form");
    assert_eq!(node.tier, PriorityTier::Medium);
    assert_eq!(node.dependencies, vec!["F1".to_owned()]);
    assert_eq!(node.status, TaskStatus::Pending);
}

#[test]
fn missing_dependency_block_means_no_dependencies() {
    let feature: Feature = serde_json::from_str(r#"{"id": "F1"}"#).expect("parses");
    assert!(feature.depends_on().is_empty());
}

#[test]
fn unknown_fields_survive_a_round_trip() {
    let raw = r#"{
        "project_name": "demo",
        "schema_version": 2,
        "features": [
            { "id": "F1", "steps": ["a", "b"], "owner": "ops" }
        ]
    }"#;
    let list = FeatureList::from_json(raw).expect("parses");
    assert_eq!(list.extra.get("schema_version"), Some(&serde_json::json!(2)));

    let rendered = list.to_json().expect("renders");
    let value: serde_json::Value = serde_json::from_str(&rendered).expect("valid json");
    assert_eq!(value["features"][0]["steps"], serde_json::json!(["a", "b"]));
    assert_eq!(value["features"][0]["owner"], "ops");
    assert_eq!(value["schema_version"], 2);
}

#[test]
fn malformed_backlog_is_an_error() {
    assert!(FeatureList::from_json("[1, 2").is_err());
}
