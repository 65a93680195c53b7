use std::path::PathBuf;

use agent_foreman::models::session::{SessionRecord, SessionStatus};
use agent_foreman::AppError;

fn record(status: SessionStatus) -> SessionRecord {
    let mut record = SessionRecord::new(
        "alpha".into(),
        vec!["sleep".into(), "30".into()],
        PathBuf::from("/work/alpha"),
        PathBuf::from("/state/sessions/alpha.log"),
        PathBuf::from("/work/alpha/.agent_state.json"),
    );
    record.status = status;
    record
}

#[test]
fn new_record_is_pending_without_end_time() {
    let record = record(SessionStatus::Pending);
    assert_eq!(record.status, SessionStatus::Pending);
    assert_eq!(record.pid, 0);
    assert!(record.end_time.is_none());
    assert_eq!(record.container(), None);
}

#[test]
fn status_labels_are_lowercase() {
    assert_eq!(SessionStatus::Running.to_string(), "running");
    assert_eq!(SessionStatus::Completed.as_str(), "completed");
}

#[test]
fn terminal_and_live_classification() {
    for status in [
        SessionStatus::Stopped,
        SessionStatus::Completed,
        SessionStatus::Error,
    ] {
        assert!(status.is_terminal());
        assert!(!status.is_live());
    }
    assert!(SessionStatus::Running.is_live());
    assert!(SessionStatus::Paused.is_live());
    assert!(!SessionStatus::Pending.is_terminal());
    assert!(!SessionStatus::Pending.is_live());
}

#[test]
fn allowed_transitions() {
    use SessionStatus::{Completed, Error, Paused, Pending, Running, Stopped};

    let allowed = [
        (Pending, Running),
        (Pending, Error),
        (Running, Paused),
        (Running, Stopped),
        (Running, Completed),
        (Running, Error),
        (Paused, Running),
        (Paused, Stopped),
        (Stopped, Running),
        (Completed, Running),
        (Error, Running),
    ];
    for (from, to) in allowed {
        assert!(record(from).can_transition_to(to), "{from} -> {to}");
    }
}

#[test]
fn rejected_transitions() {
    use SessionStatus::{Completed, Paused, Pending, Running, Stopped};

    let rejected = [
        (Pending, Paused),
        (Stopped, Paused),
        (Completed, Stopped),
        (Running, Running),
        (Paused, Paused),
    ];
    for (from, to) in rejected {
        assert!(!record(from).can_transition_to(to), "{from} -> {to}");
    }
}

#[test]
fn invalid_transition_is_invalid_state() {
    let mut record = record(SessionStatus::Stopped);
    let err = record
        .transition(SessionStatus::Paused)
        .expect_err("stopped cannot pause");
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(record.status, SessionStatus::Stopped);
}

#[test]
fn terminal_transition_sets_end_time_and_restart_clears_it() {
    let mut record = record(SessionStatus::Running);
    record.transition(SessionStatus::Stopped).expect("stop");
    assert!(record.end_time.is_some());

    record.transition(SessionStatus::Running).expect("restart");
    assert!(record.end_time.is_none());
}

#[test]
fn container_requires_non_empty_id() {
    let mut record = record(SessionStatus::Running);
    record.container_id = Some(String::new());
    assert_eq!(record.container(), None);
    record.container_id = Some("c0ffee".into());
    assert_eq!(record.container(), Some("c0ffee"));
}

#[test]
fn record_serializes_as_snake_case_json() {
    let mut record = record(SessionStatus::Running);
    record.start_commit_sha = Some("abc123".into());
    let json = serde_json::to_string(&record).expect("serialize");

    assert!(json.contains("\"status\":\"running\""));
    assert!(json.contains("\"start_commit_sha\":\"abc123\""));
    assert!(!json.contains("end_commit_sha"), "unset options are omitted");

    let back: SessionRecord = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, record);
}
