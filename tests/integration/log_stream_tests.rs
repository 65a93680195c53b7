//! Log reading: one-shot, follow with cancellation, multi-session fan-in, tail.

use std::io::Write as _;
use std::time::Duration;

use agent_foreman::models::session::{SessionRecord, SessionStatus};
use agent_foreman::orchestrator::LogLine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{ContainerState, FakeRuntime, Harness};

fn seed_with_log(h: &Harness, name: &str, status: SessionStatus, log: &str) -> SessionRecord {
    let workspace = h.workspace(name);
    let mut record = SessionRecord::new(
        name.to_owned(),
        vec!["agent".into()],
        workspace.clone(),
        h.orchestrator.store().log_path(name),
        workspace.join(".agent_state.json"),
    );
    record.status = status;
    record.container_id = Some(format!("ctr-{name}"));
    std::fs::write(&record.log_file, log).expect("log");
    h.seed_record(&record);
    record
}

fn running_container(h: &Harness, name: &str) {
    h.runtime
        .known
        .lock()
        .unwrap()
        .insert(format!("ctr-{name}"), ContainerState::Running);
}

async fn drain(mut rx: mpsc::Receiver<LogLine>) -> Vec<LogLine> {
    let mut lines = Vec::new();
    let collect = async {
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("stream closed");
    lines
}

#[tokio::test]
async fn read_without_follow_ends_at_eof() {
    let h = Harness::new();
    seed_with_log(&h, "one", SessionStatus::Completed, "first\r\nsecond\nunterminated");

    let rx = h
        .orchestrator
        .read_logs("one", false, None, CancellationToken::new())
        .await
        .expect("read");
    let texts: Vec<String> = drain(rx).await.into_iter().map(|l| l.text).collect();
    assert_eq!(texts, ["first", "second", "unterminated"]);
}

#[tokio::test]
async fn filter_keeps_matching_lines_only() {
    let h = Harness::new();
    seed_with_log(&h, "noisy", SessionStatus::Completed, "INFO a\nERROR b\nINFO c\nERROR d\n");

    let rx = h
        .orchestrator
        .read_logs("noisy", false, Some("ERROR".into()), CancellationToken::new())
        .await
        .expect("read");
    let lines = drain(rx).await;
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.session.is_none()));
    assert_eq!(lines[1].to_string(), "ERROR d");
}

#[tokio::test]
async fn missing_log_or_session_is_not_found() {
    let h = Harness::new();
    let record = seed_with_log(&h, "nolog", SessionStatus::Completed, "");
    std::fs::remove_file(&record.log_file).expect("remove log");

    let err = h
        .orchestrator
        .read_logs("nolog", false, None, CancellationToken::new())
        .await
        .expect_err("no log");
    assert!(err.is_not_found(), "{err}");

    let err = h
        .orchestrator
        .tail_logs("ghost", 5)
        .await
        .expect_err("no session");
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn follow_sees_appended_lines_until_cancelled() {
    let h = Harness::new();
    let record = seed_with_log(&h, "live", SessionStatus::Completed, "boot\n");
    let cancel = CancellationToken::new();

    let mut rx = h
        .orchestrator
        .read_logs("live", true, None, cancel.clone())
        .await
        .expect("follow");

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first line")
        .expect("open");
    assert_eq!(first.text, "boot");

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&record.log_file)
        .expect("append");
    file.write_all(b"half").expect("partial");
    file.flush().expect("flush");
    tokio::time::sleep(Duration::from_millis(100)).await;
    file.write_all(b" line\n").expect("rest");
    file.flush().expect("flush");

    let next = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("appended line")
        .expect("open");
    assert_eq!(next.text, "half line");

    cancel.cancel();
    let rest = drain(rx).await;
    assert!(rest.is_empty());
}

#[tokio::test]
async fn fan_in_prefixes_running_sessions_only() {
    let h = Harness::with_runtime(FakeRuntime::new(true));
    seed_with_log(&h, "a", SessionStatus::Running, "a1 match\na2\na3 match\n");
    seed_with_log(&h, "b", SessionStatus::Running, "b1 match\n");
    seed_with_log(&h, "done", SessionStatus::Completed, "d1 match\n");
    running_container(&h, "a");
    running_container(&h, "b");

    let rx = h
        .orchestrator
        .read_all_running_logs(false, Some("match".into()), CancellationToken::new())
        .await
        .expect("fan-in");
    let lines = drain(rx).await;

    let rendered: Vec<String> = lines.iter().map(ToString::to_string).collect();
    assert_eq!(rendered.len(), 3, "{rendered:?}");
    assert!(rendered.contains(&"[b] b1 match".to_owned()));

    // Per-session order survives the merge.
    let from_a: Vec<&str> = lines
        .iter()
        .filter(|l| l.session.as_deref() == Some("a"))
        .map(|l| l.text.as_str())
        .collect();
    assert_eq!(from_a, ["a1 match", "a3 match"]);
}

#[tokio::test]
async fn fan_in_with_nothing_running_closes_immediately() {
    let h = Harness::new();
    seed_with_log(&h, "idle", SessionStatus::Stopped, "x\n");

    let rx = h
        .orchestrator
        .read_all_running_logs(true, None, CancellationToken::new())
        .await
        .expect("fan-in");
    assert!(drain(rx).await.is_empty());
}

#[tokio::test]
async fn tail_returns_last_lines() {
    let h = Harness::new();
    seed_with_log(&h, "long", SessionStatus::Completed, "1\n2\n3\n4\n5\n");

    let tail = h.orchestrator.tail_logs("long", 2).await.expect("tail");
    assert_eq!(tail, ["4", "5"]);

    let all = h.orchestrator.tail_logs("long", 50).await.expect("tail");
    assert_eq!(all.len(), 5);
}
