//! Worker process supervision.
//!
//! A [`ProcessSupervisor`] owns the OS-level (or container-level) side of a
//! session: spawning, signalling, and liveness probes. It never mutates a
//! record's status; the orchestrator does that once an operation succeeds.

use std::fs::OpenOptions;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::driver::{BoxFuture, ContainerRuntime};
use crate::models::session::{SessionRecord, SessionStatus};
use crate::{AppError, Result};

/// Interval between liveness probes while waiting for a worker to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the kernel to reap a worker after a forced kill.
const KILL_WAIT: Duration = Duration::from_secs(1);

/// Identity of a freshly spawned worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOutcome {
    /// Local process id; 0 for containerized workers.
    pub pid: u32,
    /// Container id for containerized workers.
    pub container_id: Option<String>,
}

/// Process and container control used by the orchestrator.
pub trait ProcessSupervisor: Send + Sync {
    /// Spawn the worker described by `record`, redirecting its output into
    /// `record.log_file`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the worker is already running,
    /// `AppError::ExternalFailure` if the spawn fails.
    fn start<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, SpawnOutcome>;

    /// Ask the worker to terminate and wait briefly for it to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalFailure` if the worker cannot be signalled.
    fn stop<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, ()>;

    /// Suspend a running worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` unless the record is `Running`, and
    /// `AppError::Unsupported` if the container runtime cannot pause.
    fn pause<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, ()>;

    /// Continue a suspended worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` unless the record is `Paused`.
    fn resume<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, ()>;

    /// Zero-cost probe of a local pid.
    fn is_alive(&self, pid: u32) -> bool;

    /// Whether the worker behind `record` is still running, whatever its
    /// stored status claims.
    fn is_running<'a>(
        &'a self,
        record: &'a SessionRecord,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>>;

    /// Re-spawn a worker that is no longer running.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the worker is still running.
    fn restart<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, SpawnOutcome> {
        Box::pin(async move {
            if self.is_running(record).await {
                return Err(AppError::InvalidState(
                    "cannot restart a running session".into(),
                ));
            }
            self.start(record).await
        })
    }
}

/// Signals the supervisor sends to local workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerSignal {
    Terminate,
    Kill,
    Suspend,
    Continue,
}

/// Supervisor for local processes and runtime-managed containers.
pub struct LocalSupervisor {
    runtime: Arc<dyn ContainerRuntime>,
    stop_grace: Duration,
}

impl LocalSupervisor {
    /// Build a supervisor delegating container records to `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, stop_grace: Duration) -> Self {
        Self {
            runtime,
            stop_grace,
        }
    }

    async fn spawn_local(&self, record: &SessionRecord) -> Result<SpawnOutcome> {
        let (program, args) = record
            .command
            .split_first()
            .ok_or_else(|| AppError::InvalidArgument("command cannot be empty".into()))?;

        let (stdout, stderr) = open_log_pair(record)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&record.workspace)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        // Own process group: an interrupt aimed at the CLI must not reach the
        // worker, and every worker signal targets this group.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::ExternalFailure(format!("failed to spawn '{program}': {err}"))
        })?;
        let pid = child
            .id()
            .ok_or_else(|| AppError::ExternalFailure("spawned process has no pid".into()))?;

        // Reap the child while this invocation lives so liveness probes see it exit.
        let session = record.name.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(session, %status, "worker exited"),
                Err(err) => warn!(session, %err, "failed to wait on worker"),
            }
        });

        info!(session = record.name, pid, "worker process spawned");
        Ok(SpawnOutcome {
            pid,
            container_id: None,
        })
    }

    async fn start_container(&self, record: &SessionRecord, id: &str) -> Result<SpawnOutcome> {
        let since = Utc::now();
        self.runtime.start(id).await?;

        if let Some(argv) = self.runtime.follow_logs_argv(id, since) {
            if let Some((program, args)) = argv.split_first() {
                let (stdout, stderr) = open_log_pair(record)?;
                match Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(stdout)
                    .stderr(stderr)
                    .spawn()
                {
                    Ok(mut follower) => {
                        let session = record.name.clone();
                        tokio::spawn(async move {
                            match follower.wait().await {
                                Ok(status) if status.success() => {
                                    debug!(session, %status, "container log follower exited");
                                }
                                Ok(status) => {
                                    warn!(session, %status, "container log follower failed");
                                }
                                Err(err) => warn!(session, %err, "failed to wait on container log follower"),
                            }
                        });
                    }
                    Err(err) => {
                        warn!(session = record.name, %err, "failed to attach container log follower");
                    }
                }
            }
        }

        info!(session = record.name, container = id, "worker container started");
        Ok(SpawnOutcome {
            pid: 0,
            container_id: Some(id.to_owned()),
        })
    }

    /// Wait until no member of the worker's process group remains.
    async fn wait_for_exit(pid: u32, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        while group_is_alive(pid) {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        true
    }
}

impl ProcessSupervisor for LocalSupervisor {
    fn start<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, SpawnOutcome> {
        let span = info_span!("supervisor_start", session = record.name);
        Box::pin(
            async move {
                if record.status == SessionStatus::Running && self.is_running(record).await {
                    return Err(AppError::InvalidState(format!(
                        "session '{}' is already running",
                        record.name
                    )));
                }
                match record.container() {
                    Some(id) => self.start_container(record, id).await,
                    None => self.spawn_local(record).await,
                }
            }
            .instrument(span),
        )
    }

    fn stop<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, ()> {
        let span = info_span!("supervisor_stop", session = record.name);
        Box::pin(
            async move {
                if let Some(id) = record.container() {
                    return match self.runtime.stop(id).await {
                        Err(err) if err.is_not_found() => {
                            warn!(container = id, "container already gone");
                            Ok(())
                        }
                        other => other,
                    };
                }

                // The leader may be gone while its descendants still hold the group.
                let pid = record.pid;
                if !group_is_alive(pid) {
                    debug!(pid, "worker already exited");
                    return Ok(());
                }

                match send_signal(pid, WorkerSignal::Terminate) {
                    // Exited between the probe and the signal.
                    Err(AppError::InvalidState(_)) => return Ok(()),
                    other => other?,
                }
                if record.status == SessionStatus::Paused {
                    // A stopped process cannot act on SIGTERM until continued.
                    match send_signal(pid, WorkerSignal::Continue) {
                        Err(AppError::InvalidState(_)) => return Ok(()),
                        other => other?,
                    }
                }

                if Self::wait_for_exit(pid, self.stop_grace).await {
                    info!(pid, "worker exited after termination request");
                    return Ok(());
                }

                warn!(pid, grace_ms = self.stop_grace.as_millis(), "worker ignored termination request, killing");
                match send_signal(pid, WorkerSignal::Kill) {
                    Err(AppError::InvalidState(_)) => return Ok(()),
                    other => other?,
                }
                if !Self::wait_for_exit(pid, KILL_WAIT).await {
                    warn!(pid, "worker still visible after kill");
                }
                Ok(())
            }
            .instrument(span),
        )
    }

    fn pause<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if record.status != SessionStatus::Running {
                return Err(AppError::InvalidState("session is not running".into()));
            }
            match record.container() {
                Some(id) => self.runtime.pause(id).await,
                None => send_signal(record.pid, WorkerSignal::Suspend),
            }
        })
    }

    fn resume<'a>(&'a self, record: &'a SessionRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if record.status != SessionStatus::Paused {
                return Err(AppError::InvalidState("session is not paused".into()));
            }
            match record.container() {
                Some(id) => self.runtime.resume(id).await,
                None => send_signal(record.pid, WorkerSignal::Continue),
            }
        })
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid_is_alive(pid)
    }

    fn is_running<'a>(
        &'a self,
        record: &'a SessionRecord,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match record.container() {
                Some(id) => match self.runtime.is_running(id).await {
                    Ok(running) => running,
                    Err(err) => {
                        debug!(container = id, %err, "container probe failed, treating as stopped");
                        false
                    }
                },
                None => self.is_alive(record.pid),
            }
        })
    }
}

/// Open the session log twice in append mode, once per output stream.
fn open_log_pair(record: &SessionRecord) -> Result<(Stdio, Stdio)> {
    if let Some(parent) = record.log_file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| AppError::Io(format!("failed to create log directory: {err}")))?;
    }
    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&record.log_file)
        .map_err(|err| {
            AppError::Io(format!(
                "failed to open log {}: {err}",
                record.log_file.display()
            ))
        })?;
    let stderr = stdout
        .try_clone()
        .map_err(|err| AppError::Io(format!("failed to share log handle: {err}")))?;
    Ok((Stdio::from(stdout), Stdio::from(stderr)))
}

/// Signal-0 liveness probe. `EPERM` still means the process exists.
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Liveness probing needs POSIX signals.
#[cfg(not(unix))]
pub fn pid_is_alive(_pid: u32) -> bool {
    false
}

/// Signal-0 probe of the process group led by `pgid`. True while any member,
/// leader or descendant, is still around.
#[cfg(unix)]
fn group_is_alive(pgid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match i32::try_from(pgid) {
        Ok(raw) if raw > 0 => matches!(killpg(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM)),
        _ => false,
    }
}

#[cfg(not(unix))]
fn group_is_alive(_pgid: u32) -> bool {
    false
}

/// Deliver `signal` to the whole process group the worker leads, so children
/// it forked are suspended, continued and terminated along with it.
#[cfg(unix)]
fn send_signal(pid: u32, signal: WorkerSignal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| AppError::InvalidState(format!("session has no local process (pid {pid})")))?;
    let sig = match signal {
        WorkerSignal::Terminate => Signal::SIGTERM,
        WorkerSignal::Kill => Signal::SIGKILL,
        WorkerSignal::Suspend => Signal::SIGSTOP,
        WorkerSignal::Continue => Signal::SIGCONT,
    };
    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(AppError::InvalidState(format!(
            "process group {pid} not found"
        ))),
        Err(err) => Err(AppError::ExternalFailure(format!(
            "failed to send {} to process group {pid}: {err}",
            sig.as_str()
        ))),
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, signal: WorkerSignal) -> Result<()> {
    Err(AppError::Unsupported(format!(
        "cannot deliver {signal:?} to {pid}: process signals need a unix host"
    )))
}
