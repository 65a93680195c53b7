//! Shared fixtures for orchestrator-level integration tests.
//!
//! Provides in-memory [`VersionControl`] and [`ContainerRuntime`] fakes and a
//! [`Harness`] that wires a [`SessionOrchestrator`] to an isolated state root.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_foreman::config::GlobalConfig;
use agent_foreman::driver::{BoxFuture, ContainerRuntime, ContainerSummary, VersionControl};
use agent_foreman::models::session::SessionRecord;
use agent_foreman::orchestrator::supervisor::pid_is_alive;
use agent_foreman::orchestrator::{LocalSupervisor, SessionOrchestrator, WorkspaceGuard};
use agent_foreman::persistence::SessionStore;
use agent_foreman::AppError;

/// Version control fake: a fixed current commit, a tag set, canned diffs.
#[derive(Default)]
pub struct FakeVcs {
    pub commit: Mutex<Option<String>>,
    pub tags: Mutex<HashSet<String>>,
    pub diff: Mutex<String>,
    pub fail_tagging: Mutex<bool>,
}

impl FakeVcs {
    pub fn with_commit(sha: &str) -> Self {
        let vcs = Self::default();
        *vcs.commit.lock().unwrap() = Some(sha.to_owned());
        vcs
    }

    pub fn set_commit(&self, sha: &str) {
        *self.commit.lock().unwrap() = Some(sha.to_owned());
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.lock().unwrap().contains(name)
    }
}

impl VersionControl for FakeVcs {
    fn tag<'a>(&'a self, _workspace: &'a Path, name: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if *self.fail_tagging.lock().unwrap() {
                return Err(AppError::ExternalFailure("tag refused".into()));
            }
            self.tags.lock().unwrap().insert(name.to_owned());
            Ok(())
        })
    }

    fn delete_tag<'a>(&'a self, _workspace: &'a Path, name: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.tags.lock().unwrap().remove(name) {
                Ok(())
            } else {
                Err(AppError::NotFound(format!("tag '{name}' not found")))
            }
        })
    }

    fn checkout<'a>(&'a self, _workspace: &'a Path, _reference: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn diff<'a>(
        &'a self,
        _workspace: &'a Path,
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let canned = self.diff.lock().unwrap().clone();
            if canned.is_empty() {
                Ok(String::new())
            } else {
                Ok(format!("# {from}..{to}\n{canned}"))
            }
        })
    }

    fn log<'a>(&'a self, _workspace: &'a Path, _max_count: usize) -> BoxFuture<'a, String> {
        Box::pin(async { Ok(String::new()) })
    }

    fn current_commit<'a>(&'a self, _workspace: &'a Path) -> BoxFuture<'a, String> {
        Box::pin(async move {
            self.commit
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::ExternalFailure("not a repository".into()))
        })
    }
}

/// Container runtime fake tracking running/paused state per id.
pub struct FakeRuntime {
    pub pause_supported: bool,
    pub known: Mutex<HashMap<String, ContainerState>>,
    pub removed: Mutex<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Stopped,
}

impl FakeRuntime {
    pub fn new(pause_supported: bool) -> Self {
        Self {
            pause_supported,
            known: Mutex::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_container(self, id: &str) -> Self {
        self.known
            .lock()
            .unwrap()
            .insert(id.to_owned(), ContainerState::Created);
        self
    }

    pub fn state(&self, id: &str) -> Option<ContainerState> {
        self.known.lock().unwrap().get(id).copied()
    }

    fn set(&self, id: &str, state: ContainerState) -> agent_foreman::Result<()> {
        let mut known = self.known.lock().unwrap();
        match known.get_mut(id) {
            Some(slot) => {
                *slot = state;
                Ok(())
            }
            None => Err(AppError::NotFound(format!("No such container: {id}"))),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    fn list(&self, _filter: Option<&str>) -> BoxFuture<'_, Vec<ContainerSummary>> {
        let rows = self
            .known
            .lock()
            .unwrap()
            .iter()
            .map(|(id, state)| ContainerSummary {
                id: id.clone(),
                name: id.clone(),
                status: format!("{state:?}"),
            })
            .collect();
        Box::pin(async move { Ok(rows) })
    }

    fn start(&self, id: &str) -> BoxFuture<'_, ()> {
        let outcome = self.set(id, ContainerState::Running);
        Box::pin(async move { outcome })
    }

    fn stop(&self, id: &str) -> BoxFuture<'_, ()> {
        let outcome = self.set(id, ContainerState::Stopped);
        Box::pin(async move { outcome })
    }

    fn pause(&self, id: &str) -> BoxFuture<'_, ()> {
        let outcome = if self.pause_supported {
            self.set(id, ContainerState::Paused)
        } else {
            Err(AppError::Unsupported("runtime cannot pause containers".into()))
        };
        Box::pin(async move { outcome })
    }

    fn resume(&self, id: &str) -> BoxFuture<'_, ()> {
        let outcome = if self.pause_supported {
            self.set(id, ContainerState::Running)
        } else {
            Err(AppError::Unsupported("runtime cannot pause containers".into()))
        };
        Box::pin(async move { outcome })
    }

    fn remove(&self, id: &str) -> BoxFuture<'_, ()> {
        let outcome = match self.known.lock().unwrap().remove(id) {
            Some(_) => {
                self.removed.lock().unwrap().push(id.to_owned());
                Ok(())
            }
            None => Err(AppError::NotFound(format!("No such container: {id}"))),
        };
        Box::pin(async move { outcome })
    }

    fn exec(&self, _id: &str, argv: &[String]) -> BoxFuture<'_, String> {
        let joined = argv.join(" ");
        Box::pin(async move { Ok(joined) })
    }

    fn logs(&self, _id: &str, _lines: Option<usize>) -> BoxFuture<'_, String> {
        Box::pin(async { Ok(String::new()) })
    }

    fn is_running(&self, id: &str) -> BoxFuture<'_, bool> {
        let outcome = match self.state(id) {
            Some(state) => Ok(matches!(state, ContainerState::Running | ContainerState::Paused)),
            None => Err(AppError::NotFound(format!("No such container: {id}"))),
        };
        Box::pin(async move { outcome })
    }
}

/// Isolated orchestrator stack rooted in a temp directory.
pub struct Harness {
    pub temp: tempfile::TempDir,
    pub config: GlobalConfig,
    pub vcs: Arc<FakeVcs>,
    pub runtime: Arc<FakeRuntime>,
    pub orchestrator: SessionOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runtime(FakeRuntime::new(true))
    }

    pub fn with_runtime(runtime: FakeRuntime) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = GlobalConfig {
            state_root: temp.path().join("state"),
            stop_grace_ms: 500,
            log_poll_interval_ms: 20,
            ..GlobalConfig::default()
        };
        let vcs = Arc::new(FakeVcs::with_commit("c0"));
        let runtime = Arc::new(runtime);
        let supervisor = Arc::new(LocalSupervisor::new(
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            config.stop_grace(),
        ));
        let store = SessionStore::open(config.sessions_dir()).expect("store");
        let orchestrator = SessionOrchestrator::new(
            store,
            supervisor,
            Arc::clone(&vcs) as Arc<dyn VersionControl>,
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            &config,
        )
        .with_workspace_guard(
            WorkspaceGuard::from_config(&config.prune).with_temp_root(temp.path()),
        );
        Self {
            temp,
            config,
            vcs,
            runtime,
            orchestrator,
        }
    }

    /// Create a workspace directory under the harness root.
    pub fn workspace(&self, name: &str) -> PathBuf {
        let dir = self.temp.path().join("workspaces").join(name);
        std::fs::create_dir_all(&dir).expect("workspace dir");
        dir
    }

    /// Write a terminal record directly into the store.
    pub fn seed_record(&self, record: &SessionRecord) {
        self.orchestrator.store().save(record).expect("seed record");
    }
}

/// `sh -c <script>` as an argument vector.
pub fn shell(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

/// Poll until `pid` is gone, up to five seconds.
pub async fn wait_for_exit(pid: u32) {
    for _ in 0..100 {
        if !pid_is_alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("process {pid} did not exit");
}

