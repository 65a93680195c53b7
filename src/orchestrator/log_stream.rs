//! Session log streaming.
//!
//! A reader task per log file feeds an mpsc queue. Follow mode keeps polling
//! past end-of-file until the caller cancels. [`SessionOrchestrator::read_all_running_logs`]
//! fans one reader per running session into a shared queue, waits for every
//! reader behind a completion barrier, and then closes the queue.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SessionOrchestrator;
use crate::models::session::SessionStatus;
use crate::{AppError, Result};

/// Queue depth between readers and the consumer.
const CHANNEL_CAPACITY: usize = 256;

/// One line of worker output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Session the line came from; set for multi-session streams.
    pub session: Option<String>,
    /// Line text without its terminator.
    pub text: String,
}

impl Display for LogLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.session {
            Some(name) => write!(f, "[{name}] {}", self.text),
            None => f.write_str(&self.text),
        }
    }
}

/// Settings shared by every reader of one stream.
#[derive(Debug, Clone)]
struct ReaderOptions {
    label: Option<String>,
    follow: bool,
    poll: Duration,
    filter: Option<String>,
}

fn matches_filter(filter: Option<&str>, text: &str) -> bool {
    filter.is_none_or(|f| text.contains(f))
}

async fn open_log(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("log file {} does not exist", path.display()))
        } else {
            AppError::Io(format!("failed to open {}: {err}", path.display()))
        }
    })?;
    Ok(BufReader::new(file))
}

/// Pump lines from `reader` into `tx` until EOF (or cancellation in follow mode).
async fn pump_lines(
    mut reader: BufReader<File>,
    options: ReaderOptions,
    tx: mpsc::Sender<LogLine>,
    cancel: CancellationToken,
) {
    let mut partial: Vec<u8> = Vec::new();
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let mut chunk = Vec::new();
        match reader.read_until(b'\n', &mut chunk).await {
            Ok(0) => {
                if !options.follow {
                    if !partial.is_empty() {
                        let text = String::from_utf8_lossy(&partial).into_owned();
                        emit(&tx, &options, text).await;
                    }
                    break;
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(options.poll) => {}
                }
            }
            Ok(_) => {
                partial.extend_from_slice(&chunk);
                if partial.last() != Some(&b'\n') {
                    // Writer is mid-line; wait for the rest.
                    continue;
                }
                partial.pop();
                if partial.last() == Some(&b'\r') {
                    partial.pop();
                }
                let text = String::from_utf8_lossy(&partial).into_owned();
                partial.clear();
                if !emit(&tx, &options, text).await {
                    break;
                }
            }
            Err(err) => {
                warn!(session = ?options.label, %err, "log read failed");
                break;
            }
        }
    }
    debug!(session = ?options.label, "log reader finished");
}

/// Send one line if it passes the filter. Returns `false` once the receiver is gone.
async fn emit(tx: &mpsc::Sender<LogLine>, options: &ReaderOptions, text: String) -> bool {
    if !matches_filter(options.filter.as_deref(), &text) {
        return true;
    }
    tx.send(LogLine {
        session: options.label.clone(),
        text,
    })
    .await
    .is_ok()
}

impl SessionOrchestrator {
    /// Stream one session's log.
    ///
    /// Without `follow` the stream ends at end-of-file. With `follow` it keeps
    /// polling every `log_poll_interval` until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session or its log file is missing.
    pub async fn read_logs(
        &self,
        name: &str,
        follow: bool,
        filter: Option<String>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<LogLine>> {
        let record = self.load_any(name)?;
        let reader = open_log(&record.log_file).await?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let options = ReaderOptions {
            label: None,
            follow,
            poll: self.log_poll_interval,
            filter,
        };
        tokio::spawn(pump_lines(reader, options, tx, cancel));
        Ok(rx)
    }

    /// Stream every running session's log, each line prefixed with its
    /// session name. Order is preserved within a session, not across them.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the store cannot be listed.
    pub async fn read_all_running_logs(
        &self,
        follow: bool,
        filter: Option<String>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<LogLine>> {
        let running: Vec<_> = self
            .list_sessions()
            .await?
            .into_iter()
            .filter(|r| r.status == SessionStatus::Running)
            .collect();

        let (queue_tx, mut queue_rx) = mpsc::channel::<LogLine>(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut readers = Vec::with_capacity(running.len());
        for record in running {
            match open_log(&record.log_file).await {
                Ok(reader) => {
                    let options = ReaderOptions {
                        label: Some(record.name.clone()),
                        follow,
                        poll: self.log_poll_interval,
                        filter: None,
                    };
                    readers.push(tokio::spawn(pump_lines(
                        reader,
                        options,
                        queue_tx.clone(),
                        cancel.clone(),
                    )));
                }
                Err(err) => warn!(session = record.name, %err, "skipping session log"),
            }
        }

        // Completion barrier: the queue closes only after every reader is done.
        tokio::spawn(async move {
            for outcome in join_all(readers).await {
                if let Err(err) = outcome {
                    warn!(%err, "log reader task failed");
                }
            }
            drop(queue_tx);
        });

        // Single consumer applying the filter.
        tokio::spawn(async move {
            while let Some(line) = queue_rx.recv().await {
                if matches_filter(filter.as_deref(), &line.text) && out_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        Ok(out_rx)
    }

    /// Last `lines` lines of a session's log.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session or its log file is missing.
    pub async fn tail_logs(&self, name: &str, lines: usize) -> Result<Vec<String>> {
        let record = self.load_any(name)?;
        let raw = tokio::fs::read(&record.log_file).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!(
                    "log file {} does not exist",
                    record.log_file.display()
                ))
            } else {
                AppError::Io(format!("failed to read log: {err}"))
            }
        })?;
        let text = String::from_utf8_lossy(&raw);
        let all: Vec<&str> = text.lines().collect();
        let skip = all.len().saturating_sub(lines);
        Ok(all[skip..].iter().map(|s| (*s).to_owned()).collect())
    }
}
