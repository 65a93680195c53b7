//! Snapshot save, restore, list, and delete against a seeded session.

use std::sync::Arc;

use agent_foreman::driver::VersionControl;
use agent_foreman::models::session::{SessionRecord, SessionStatus};
use agent_foreman::orchestrator::SnapshotManager;
use agent_foreman::AppError;

use super::test_helpers::Harness;

const STATE: &str = ".agent_state.json";
const DB: &str = ".foreman.db";

fn seeded(h: &Harness) -> (SessionRecord, SnapshotManager) {
    let workspace = h.workspace("snap");
    let mut record = SessionRecord::new(
        "snap".into(),
        vec!["true".into()],
        workspace.clone(),
        h.orchestrator.store().log_path("snap"),
        workspace.join(STATE),
    );
    record.status = SessionStatus::Stopped;
    h.seed_record(&record);

    let manager = SnapshotManager::from_config(
        &h.config,
        h.orchestrator.store().clone(),
        Arc::clone(&h.vcs) as Arc<dyn VersionControl>,
    );
    (record, manager)
}

#[tokio::test]
async fn restore_brings_back_captured_bytes() {
    let h = Harness::new();
    let (record, manager) = seeded(&h);
    let state = record.workspace.join(STATE);
    let db = record.workspace.join(DB);
    std::fs::write(&state, br#"{"step":1}"#).expect("state");
    std::fs::write(&db, [0u8, 159, 146, 150, 255]).expect("db");

    let snapshot = manager
        .save("before", "snap", "first checkpoint")
        .await
        .expect("save");
    assert_eq!(snapshot.files.len(), 2);
    assert!(snapshot.files.iter().all(|f| f.was_present()));
    assert_eq!(snapshot.commit_sha.as_deref(), Some("c0"));
    assert!(h.vcs.has_tag("snapshot/before"));

    std::fs::write(&state, br#"{"step":99}"#).expect("modify");
    std::fs::remove_file(&db).expect("remove");

    manager.restore("before").await.expect("restore");
    assert_eq!(std::fs::read(&state).expect("state"), br#"{"step":1}"#);
    assert_eq!(std::fs::read(&db).expect("db"), [0u8, 159, 146, 150, 255]);
}

#[tokio::test]
async fn file_absent_at_capture_is_removed_on_restore() {
    let h = Harness::new();
    let (record, manager) = seeded(&h);
    let state = record.workspace.join(STATE);
    std::fs::write(&state, b"{}").expect("state");

    let snapshot = manager.save("sparse", "snap", "").await.expect("save");
    let db_entry = snapshot
        .files
        .iter()
        .find(|f| f.source.ends_with(DB))
        .expect("db tracked");
    assert!(!db_entry.was_present());

    let db = record.workspace.join(DB);
    std::fs::write(&db, b"created later").expect("db");
    manager.restore("sparse").await.expect("restore");
    assert!(!db.exists());
    assert_eq!(std::fs::read(&state).expect("state"), b"{}");
}

#[tokio::test]
async fn corrupted_capture_is_refused_before_touching_live_files() {
    let h = Harness::new();
    let (record, manager) = seeded(&h);
    let state = record.workspace.join(STATE);
    std::fs::write(&state, b"original").expect("state");
    manager.save("guarded", "snap", "").await.expect("save");

    std::fs::write(h.config.snapshots_dir().join("guarded").join(STATE), b"tampered")
        .expect("tamper");
    std::fs::write(&state, b"live edit").expect("edit");

    let err = manager.restore("guarded").await.expect_err("checksum");
    assert!(matches!(err, AppError::Io(_)), "{err}");
    assert_eq!(std::fs::read(&state).expect("state"), b"live edit");
}

#[tokio::test]
async fn duplicate_and_unknown_names() {
    let h = Harness::new();
    let (_record, manager) = seeded(&h);

    manager.save("once", "snap", "").await.expect("save");
    let err = manager.save("once", "snap", "").await.expect_err("duplicate");
    assert!(matches!(err, AppError::AlreadyExists(_)), "{err}");

    let err = manager.save("other", "ghost", "").await.expect_err("unknown session");
    assert!(err.is_not_found(), "{err}");
    assert!(!h.config.snapshots_dir().join("other").exists());

    let err = manager.restore("never").await.expect_err("unknown snapshot");
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn failed_tag_leaves_nothing_behind() {
    let h = Harness::new();
    let (_record, manager) = seeded(&h);
    *h.vcs.fail_tagging.lock().unwrap() = true;

    let err = manager.save("untagged", "snap", "").await.expect_err("tag fails");
    assert!(matches!(err, AppError::ExternalFailure(_)), "{err}");
    assert!(!h.config.snapshots_dir().join("untagged").exists());
    assert!(manager.list().expect("list").is_empty());
}

#[tokio::test]
async fn delete_removes_directory_and_tag() {
    let h = Harness::new();
    let (_record, manager) = seeded(&h);
    manager.save("a", "snap", "first").await.expect("save a");
    manager.save("b", "snap", "second").await.expect("save b");

    let listed: Vec<String> = manager
        .list()
        .expect("list")
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&"a".to_owned()));

    manager.delete("a").await.expect("delete");
    assert!(!h.vcs.has_tag("snapshot/a"));
    assert!(h.vcs.has_tag("snapshot/b"));
    assert!(!h.config.snapshots_dir().join("a").exists());

    let err = manager.delete("a").await.expect_err("second delete");
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn missing_tag_does_not_block_delete() {
    let h = Harness::new();
    let (_record, manager) = seeded(&h);
    manager.save("orphan", "snap", "").await.expect("save");
    h.vcs.tags.lock().unwrap().clear();

    manager.delete("orphan").await.expect("delete");
    assert!(manager.list().expect("list").is_empty());
}
