#![forbid(unsafe_code)]

//! `foreman` — command-line front end for agent session supervision.
//!
//! Loads configuration, builds the orchestrator stack, and dispatches one
//! subcommand. Command output goes to stdout; diagnostics go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_foreman::audit::{AuditLogger, JsonlAuditWriter};
use agent_foreman::config::GlobalConfig;
use agent_foreman::duration::parse_duration_with_days;
use agent_foreman::models::feature::FeatureList;
use agent_foreman::models::session::SessionRecord;
use agent_foreman::orchestrator::{
    BatchReport, PruneOptions, Selection, SessionOrchestrator, SnapshotManager, StartRequest,
};
use agent_foreman::persistence::{FeatureStore, FileFeatureStore};
use agent_foreman::scheduler::{self, mermaid, TaskGraph};
use agent_foreman::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "foreman", about = "Supervise agent worker sessions", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the state root holding sessions, snapshots, and the audit trail.
    #[arg(long, global = true)]
    state_root: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new session.
    Start {
        /// Unique session name.
        name: String,
        /// Existing working directory for the worker.
        #[arg(long)]
        workspace: PathBuf,
        /// Run inside this existing container instead of a local process.
        #[arg(long)]
        container: Option<String>,
        /// Worker command, after `--`.
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Stop a running or paused session.
    Stop {
        /// Session name.
        name: String,
    },
    /// Suspend a running session.
    Pause {
        /// Session name.
        name: String,
    },
    /// Continue a paused session.
    Resume {
        /// Session name.
        name: String,
    },
    /// Re-spawn a session that is no longer running.
    Restart {
        /// Session name.
        name: String,
    },
    /// Remove a session record and its log.
    Rm {
        /// Session name.
        name: String,
        /// Stop the worker first if it is still running.
        #[arg(long)]
        force: bool,
    },
    /// List sessions.
    Ls {
        /// List archived sessions instead of active ones.
        #[arg(long)]
        archived: bool,
    },
    /// Move sessions into the archive.
    Archive {
        /// Session names.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        names: Vec<String>,
        /// Archive every active session.
        #[arg(long)]
        all: bool,
    },
    /// Move sessions back from the archive.
    Unarchive {
        /// Session names.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        names: Vec<String>,
        /// Unarchive every archived session.
        #[arg(long)]
        all: bool,
    },
    /// Remove finished sessions with their workspaces and containers.
    Prune {
        /// Include sessions in any status, not only finished ones.
        #[arg(long)]
        all: bool,
        /// Only sessions started longer ago than this (e.g. `7d`, `1d12h`).
        #[arg(long)]
        since: Option<String>,
        /// Report what would be pruned without touching anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage state snapshots.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },
    /// Print session output.
    Logs {
        /// Session name.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// Stream every running session, prefixed with its name.
        #[arg(long)]
        all: bool,
        /// Keep streaming new output until interrupted.
        #[arg(short, long)]
        follow: bool,
        /// Only lines containing this text.
        #[arg(long)]
        filter: Option<String>,
        /// Print only the last N lines.
        #[arg(long, conflicts_with_all = ["follow", "all"])]
        tail: Option<usize>,
    },
    /// Show the work done by a session as a diff.
    Diff {
        /// Session name.
        name: String,
    },
    /// Write metadata, log, and diff bundles for sessions.
    Export {
        /// Session names.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        names: Vec<String>,
        /// Export every active session.
        #[arg(long)]
        all: bool,
        /// Output directory.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render a feature plan as a Mermaid flowchart.
    Graph {
        /// Feature plan JSON file.
        plan: String,
    },
    /// Reorder a feature plan by dependencies and priority.
    Prioritize {
        /// Feature plan JSON file.
        plan: String,
        /// Print the reordered plan instead of saving it.
        #[arg(long)]
        dry_run: bool,
        /// Write to this file instead of overwriting the plan.
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum SnapshotCommand {
    /// Capture a session's state files.
    Save {
        /// Snapshot name.
        name: String,
        /// Session to capture.
        #[arg(long)]
        session: String,
        /// Free-text description.
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List snapshots, newest first.
    List,
    /// Copy a snapshot's files back into place.
    Restore {
        /// Snapshot name.
        name: String,
    },
    /// Delete a snapshot and its tag.
    Delete {
        /// Snapshot name.
        name: String,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("foreman: {err}");
        return ExitCode::FAILURE;
    }

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("foreman: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(root) = &args.state_root {
        config.state_root.clone_from(root);
    }
    debug!(state_root = %config.state_root.display(), "configuration loaded");
    Ok(config)
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;

    // Plan commands do not need the session stack.
    match &args.command {
        Command::Graph { plan } => return render_graph(plan).await,
        Command::Prioritize {
            plan,
            dry_run,
            output,
        } => return prioritize(&config, plan, *dry_run, output.as_deref()).await,
        _ => {}
    }

    let orchestrator = SessionOrchestrator::from_config(&config)?;

    match args.command {
        Command::Start {
            name,
            workspace,
            container,
            command,
        } => {
            let record = orchestrator
                .start_session(StartRequest {
                    name,
                    command,
                    workspace,
                    container_id: container,
                })
                .await?;
            println!("started {} (pid {})", record.name, record.pid);
        }
        Command::Stop { name } => {
            orchestrator.stop_session(&name).await?;
            println!("stopped {name}");
        }
        Command::Pause { name } => {
            orchestrator.pause_session(&name).await?;
            println!("paused {name}");
        }
        Command::Resume { name } => {
            orchestrator.resume_session(&name).await?;
            println!("resumed {name}");
        }
        Command::Restart { name } => {
            let record = orchestrator.restart_session(&name).await?;
            println!("restarted {} (pid {})", record.name, record.pid);
        }
        Command::Rm { name, force } => {
            orchestrator.remove_session(&name, force).await?;
            println!("removed {name}");
        }
        Command::Ls { archived } => {
            let sessions = if archived {
                orchestrator.list_archived()?
            } else {
                orchestrator.list_sessions().await?
            };
            print_sessions(&sessions);
        }
        Command::Archive { names, all } => {
            let report = orchestrator
                .archive_sessions(&selection(names, all))
                .await?;
            print_report("archived", &report);
            report.into_result()?;
        }
        Command::Unarchive { names, all } => {
            let report = orchestrator
                .unarchive_sessions(&selection(names, all))
                .await?;
            print_report("unarchived", &report);
            report.into_result()?;
        }
        Command::Prune {
            all,
            since,
            dry_run,
        } => {
            let since = since.as_deref().map(parse_duration_with_days).transpose()?;
            let report = orchestrator
                .prune_sessions(&PruneOptions {
                    all,
                    since,
                    dry_run,
                })
                .await?;
            if dry_run {
                for name in &report.candidates {
                    println!("would prune {name}");
                }
            } else {
                print_report("pruned", &report.outcome);
                report.outcome.into_result()?;
            }
        }
        Command::Snapshot { action } => {
            let mut snapshots = SnapshotManager::from_config(
                &config,
                orchestrator.store().clone(),
                orchestrator.vcs(),
            );
            if let Some(audit) = orchestrator.audit_logger() {
                snapshots = snapshots.with_audit(audit);
            }
            run_snapshot(&snapshots, action).await?;
        }
        Command::Logs {
            name,
            all,
            follow,
            filter,
            tail,
        } => stream_logs(&orchestrator, name, all, follow, filter, tail).await?,
        Command::Diff { name } => {
            print!("{}", orchestrator.session_diff(&name).await?);
        }
        Command::Export { names, all, output } => {
            let exported = orchestrator
                .export_bundle(&selection(names, all), &output)
                .await?;
            for session in exported {
                println!(
                    "{} -> {} ({})",
                    session.name,
                    session.dir.display(),
                    session.files.join(", ")
                );
            }
        }
        Command::Graph { .. } | Command::Prioritize { .. } => {}
    }
    Ok(())
}

async fn stream_logs(
    orchestrator: &SessionOrchestrator,
    name: Option<String>,
    all: bool,
    follow: bool,
    filter: Option<String>,
    tail: Option<usize>,
) -> Result<()> {
    if let (Some(name), Some(lines)) = (&name, tail) {
        for line in orchestrator.tail_logs(name, lines).await? {
            if filter.as_deref().is_none_or(|f| line.contains(f)) {
                println!("{line}");
            }
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("interrupt received, stopping log readers");
        signal_cancel.cancel();
    });

    let mut lines = match (all, name) {
        (true, _) => {
            orchestrator
                .read_all_running_logs(follow, filter, cancel)
                .await?
        }
        (false, Some(name)) => orchestrator.read_logs(&name, follow, filter, cancel).await?,
        (false, None) => {
            return Err(AppError::InvalidArgument(
                "a session name or --all is required".into(),
            ))
        }
    };
    while let Some(line) = lines.recv().await {
        println!("{line}");
    }
    Ok(())
}

async fn run_snapshot(snapshots: &SnapshotManager, action: SnapshotCommand) -> Result<()> {
    match action {
        SnapshotCommand::Save {
            name,
            session,
            description,
        } => {
            let snapshot = snapshots.save(&name, &session, &description).await?;
            println!(
                "saved snapshot {} of {} ({} files)",
                snapshot.name,
                snapshot.session,
                snapshot.files.len()
            );
        }
        SnapshotCommand::List => {
            println!("{:<24} {:<20} {:<26} DESCRIPTION", "NAME", "SESSION", "CREATED");
            for snapshot in snapshots.list()? {
                println!(
                    "{:<24} {:<20} {:<26} {}",
                    snapshot.name,
                    snapshot.session,
                    snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    snapshot.description
                );
            }
        }
        SnapshotCommand::Restore { name } => {
            let snapshot = snapshots.restore(&name).await?;
            println!("restored snapshot {} into {}", snapshot.name, snapshot.session);
        }
        SnapshotCommand::Delete { name } => {
            snapshots.delete(&name).await?;
            println!("deleted snapshot {name}");
        }
    }
    Ok(())
}

async fn render_graph(plan: &str) -> Result<()> {
    let raw = FileFeatureStore::cwd().get_features(plan).await?;
    let list = FeatureList::from_json(&raw)?;
    let graph = TaskGraph::load_from_features(&list.features)?;
    print!("{}", mermaid::render(&graph));
    Ok(())
}

async fn prioritize(
    config: &GlobalConfig,
    plan: &str,
    dry_run: bool,
    output: Option<&str>,
) -> Result<()> {
    let audit = if dry_run {
        None
    } else {
        Some(JsonlAuditWriter::new(config.audit_dir())?)
    };
    let store = FileFeatureStore::cwd();
    let outcome = scheduler::prioritize_plan(
        &store,
        plan,
        output,
        dry_run,
        audit.as_ref().map(|w| w as &dyn AuditLogger),
    )
    .await?;

    for (task, dep) in &outcome.orphans {
        eprintln!("warning: {task} depends on unknown task {dep}");
    }
    if dry_run {
        println!("{}", outcome.list.to_json()?);
    } else {
        println!(
            "prioritized {} features into {}",
            outcome.list.features.len(),
            output.unwrap_or(plan)
        );
    }
    Ok(())
}

fn selection(names: Vec<String>, all: bool) -> Selection {
    if all {
        Selection::All
    } else {
        Selection::Names(names)
    }
}

fn print_sessions(sessions: &[SessionRecord]) {
    println!(
        "{:<24} {:<10} {:<8} {:<26} WORKSPACE",
        "NAME", "STATUS", "PID", "STARTED"
    );
    for record in sessions {
        let pid = match &record.container_id {
            Some(id) => id.chars().take(8).collect(),
            None => record.pid.to_string(),
        };
        println!(
            "{:<24} {:<10} {:<8} {:<26} {}",
            record.name,
            record.status,
            pid,
            record.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            record.workspace.display()
        );
    }
}

fn print_report(verb: &str, report: &BatchReport) {
    for name in &report.succeeded {
        println!("{verb} {name}");
    }
    for (name, err) in &report.failed {
        eprintln!("failed {name}: {err}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
