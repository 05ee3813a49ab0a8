//! Exec sessions: run a command in a container and stream what it prints.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sirberus_shared::constants::container::EXEC_MONITOR_INTERVAL;
use sirberus_shared::constants::logs::CHANNEL_CAPACITY;
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ContainerRuntime, short_id};
use crate::events::{EventKind, IntoEvent, SseEvent};
use crate::logs::LineSplitter;

/// One line of exec output (stdout and stderr interleaved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput(pub String);

impl IntoEvent for ExecOutput {
    fn into_event(self) -> SseEvent {
        SseEvent::new(EventKind::Log, self.0)
    }
}

/// Split a command line on whitespace. No shell is involved, so quoting and
/// expansion are not interpreted.
pub fn parse_command(command: &str) -> SirberusResult<Vec<String>> {
    let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(SirberusError::InvalidArgument("empty command".to_string()));
    }
    Ok(argv)
}

pub struct ExecSession {
    pub output: mpsc::Receiver<ExecOutput>,
    pub errors: mpsc::Receiver<SirberusError>,
    pub task: JoinHandle<()>,
}

impl std::fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Start `command` in container `id`.
///
/// Output lines arrive on `output`. Once the output ends the exit code is
/// polled; a non-zero code is reported on `errors` before both channels close.
pub fn spawn_exec(
    runtime: Arc<dyn ContainerRuntime>,
    id: impl Into<String>,
    command: impl Into<String>,
    cancel: CancellationToken,
) -> ExecSession {
    spawn_exec_with_interval(runtime, id.into(), command.into(), cancel, EXEC_MONITOR_INTERVAL)
}

fn spawn_exec_with_interval(
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    command: String,
    cancel: CancellationToken,
    monitor_interval: Duration,
) -> ExecSession {
    let (output_tx, output) = mpsc::channel(CHANNEL_CAPACITY);
    let (errors_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);

    let task = tokio::spawn(async move {
        let result = run_exec(
            runtime.as_ref(),
            &id,
            &command,
            &cancel,
            &output_tx,
            monitor_interval,
        )
        .await;
        if let Err(e) = result {
            tracing::debug!(container = %short_id(&id), command = %command, error = %e, "Exec ended with error");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = errors_tx.send(e) => {}
            }
        }
    });

    ExecSession {
        output,
        errors,
        task,
    }
}

async fn run_exec(
    runtime: &dyn ContainerRuntime,
    id: &str,
    command: &str,
    cancel: &CancellationToken,
    output_tx: &mpsc::Sender<ExecOutput>,
    monitor_interval: Duration,
) -> SirberusResult<()> {
    let argv = parse_command(command)?;
    let attach = runtime.exec(id, argv).await?;
    tracing::info!(container = %short_id(id), command = %command, exec_id = %attach.exec_id, "Exec started");

    let mut chunks = attach.output;
    let mut splitter = LineSplitter::default();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SirberusError::Cancelled),
            chunk = chunks.next() => chunk,
        };
        match chunk {
            Some(Ok(text)) => {
                for line in splitter.push(&text) {
                    send_line(output_tx, cancel, line).await?;
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                if let Some(rest) = splitter.finish() {
                    send_line(output_tx, cancel, rest).await?;
                }
                break;
            }
        }
    }

    let mut ticker = tokio::time::interval(monitor_interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SirberusError::Cancelled),
            _ = ticker.tick() => {}
        }
        if let Some(code) = runtime.exec_exit_code(&attach.exec_id).await? {
            tracing::info!(container = %short_id(id), command = %command, code, "Exec finished");
            if code != 0 {
                return Err(SirberusError::OperationFailed(format!(
                    "command '{}' exited with code {}",
                    command, code
                )));
            }
            return Ok(());
        }
    }
}

async fn send_line(
    output_tx: &mpsc::Sender<ExecOutput>,
    cancel: &CancellationToken,
    line: String,
) -> SirberusResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SirberusError::Cancelled),
        sent = output_tx.send(ExecOutput(line)) => sent.map_err(|_| SirberusError::Cancelled),
    }
}
