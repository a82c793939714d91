//! Process Runner
//!
//! Supervises one encoder process: spawns it, turns its output into an
//! ordered stream of [`RunnerEvent`]s, and supports cancellation. Exactly one
//! [`RunnerEvent::Finished`] is sent per run and it is always the last event.

use crate::encode::{CommandFactory, EncodeJob};
use crate::item::ItemProgress;
use crate::progress::ProgressParser;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// How many trailing stderr lines feed the failure message
const DIAGNOSTIC_TAIL_LINES: usize = 3;

/// Error type for starting a run
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The encoder process could not be started
    #[error("Failed to start encoder: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Which output stream a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { output_path: PathBuf },
    Failed { message: String },
    Cancelled,
}

/// Events produced by a run, in the order the process produced them
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    Progress(ItemProgress),
    Log { stream: LogStream, line: String },
    /// Always last, sent once
    Finished(RunOutcome),
}

/// Control handle for a running encode
#[derive(Debug, Clone)]
pub struct RunHandle {
    item_id: String,
    token: CancellationToken,
    finished: watch::Receiver<bool>,
}

impl RunHandle {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Kill the encoder and wait until it has exited.
    ///
    /// The run then finishes with [`RunOutcome::Cancelled`]. Calling this on
    /// a finished run does nothing.
    pub async fn cancel(&self) {
        if self.is_finished() {
            return;
        }
        self.token.cancel();
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Wait for the run to finish without cancelling it.
    pub async fn wait(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }
}

/// Spawn the encoder for `job` and start supervising it.
///
/// Must be called from within a tokio runtime.
pub fn run(
    job: EncodeJob,
    factory: &dyn CommandFactory,
) -> Result<(RunHandle, mpsc::UnboundedReceiver<RunnerEvent>), RunnerError> {
    let mut cmd = factory.build(&job);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    tracing::info!(
        item_id = %job.item_id,
        pid = child.id().unwrap_or_default(),
        output = %job.output_path.display(),
        "encoder started"
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (finished_tx, finished_rx) = watch::channel(false);
    let token = CancellationToken::new();

    let handle = RunHandle {
        item_id: job.item_id.clone(),
        token: token.clone(),
        finished: finished_rx,
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::spawn(async move {
        let outcome = supervise(&job, &mut child, stdout, stderr, &token, &event_tx).await;
        match &outcome {
            RunOutcome::Completed { .. } => {
                tracing::info!(item_id = %job.item_id, "encode completed")
            }
            RunOutcome::Failed { message } => {
                tracing::warn!(item_id = %job.item_id, %message, "encode failed")
            }
            RunOutcome::Cancelled => tracing::info!(item_id = %job.item_id, "encode cancelled"),
        }
        let _ = event_tx.send(RunnerEvent::Finished(outcome));
        finished_tx.send_replace(true);
    });

    Ok((handle, event_rx))
}

async fn supervise(
    job: &EncodeJob,
    child: &mut Child,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    token: &CancellationToken,
    events: &mpsc::UnboundedSender<RunnerEvent>,
) -> RunOutcome {
    let mut parser = ProgressParser::new(job.duration_secs);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

    let mut stdout_lines = stdout.map(|s| BufReader::new(s).lines());
    let mut stderr_lines = stderr.map(|s| BufReader::new(s).lines());
    let mut stdout_open = stdout_lines.is_some();
    let mut stderr_open = stderr_lines.is_some();

    // Drain both streams until EOF so every line is delivered before the
    // outcome. Cancellation stops reading immediately.
    while stdout_open || stderr_open {
        tokio::select! {
            _ = token.cancelled() => {
                return kill_and_reap(job, child).await;
            }
            line = next_line(&mut stdout_lines), if stdout_open => match line {
                Some(line) => {
                    if let Some(progress) = parser.parse_line(&line) {
                        let _ = events.send(RunnerEvent::Progress(progress));
                    }
                    let _ = events.send(RunnerEvent::Log { stream: LogStream::Stdout, line });
                }
                None => stdout_open = false,
            },
            line = next_line(&mut stderr_lines), if stderr_open => match line {
                Some(line) => {
                    if let Some(progress) = parser.parse_line(&line) {
                        let _ = events.send(RunnerEvent::Progress(progress));
                    } else if !line.trim().is_empty() {
                        if tail.len() == DIAGNOSTIC_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.trim().to_string());
                    }
                    let _ = events.send(RunnerEvent::Log { stream: LogStream::Stderr, line });
                }
                None => stderr_open = false,
            },
        }
    }

    let status = tokio::select! {
        _ = token.cancelled() => {
            return kill_and_reap(job, child).await;
        }
        status = child.wait() => status,
    };

    match status {
        Ok(status) if status.success() => RunOutcome::Completed {
            output_path: job.output_path.clone(),
        },
        Ok(status) => RunOutcome::Failed {
            message: failure_message(status, &tail),
        },
        Err(e) => RunOutcome::Failed {
            message: format!("Failed to wait for encoder: {}", e),
        },
    }
}

async fn next_line<R>(lines: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

async fn kill_and_reap(job: &EncodeJob, child: &mut Child) -> RunOutcome {
    if let Err(e) = child.start_kill() {
        tracing::debug!(item_id = %job.item_id, error = %e, "kill failed, process already gone");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(item_id = %job.item_id, error = %e, "failed to reap cancelled encoder");
    }
    RunOutcome::Cancelled
}

/// Human-readable failure from the last diagnostic lines, else the exit code
pub fn failure_message(status: ExitStatus, tail: &VecDeque<String>) -> String {
    if !tail.is_empty() {
        return tail.iter().cloned().collect::<Vec<_>>().join("\n");
    }
    match status.code() {
        Some(code) => format!("Encoder exited with code {}", code),
        None => "Encoder was terminated by a signal".to_string(),
    }
}
