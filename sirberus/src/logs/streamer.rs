//! Background log retrieval with transparent restarts.
//!
//! Each session runs one task through these states:
//!
//! ```text
//! POSITIONING -> STREAMING -> (RESTARTING -> POSITIONING -> STREAMING)* -> TERMINATED
//! ```
//!
//! Restarts are a bounded loop inside the task. The source is closed before
//! the channels are dropped, so a closed channel means no child process is
//! left behind.

use std::time::Duration;

use sirberus_shared::constants::logs::{
    CHANNEL_CAPACITY, MAX_CONSECUTIVE_RESTARTS, POLL_INTERVAL, RESTART_DELAY, RESTART_LINES,
    STABLE_RUN,
};
use sirberus_shared::errors::SirberusError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use super::cursor::{CursorMode, CursorPositioner};
use super::{LogLine, LogRequest, LogSource, Pull};

/// Streaming tunables.
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub restart_delay: Duration,
    pub restart_lines: usize,
    pub poll_interval: Duration,
    pub max_restarts: u32,
    /// Uptime after which an attempt resets the restart count.
    pub stable_run: Duration,
    pub channel_capacity: usize,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            restart_delay: RESTART_DELAY,
            restart_lines: RESTART_LINES,
            poll_interval: POLL_INTERVAL,
            max_restarts: MAX_CONSECUTIVE_RESTARTS,
            stable_run: STABLE_RUN,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Handle to one open log stream.
///
/// Dropping the session (or its guard, once destructured) cancels the
/// background task.
pub struct StreamSession {
    pub id: Uuid,
    pub lines: mpsc::Receiver<LogLine>,
    pub errors: mpsc::Receiver<SirberusError>,
    pub cancel: CancellationToken,
    pub guard: DropGuard,
    pub task: JoinHandle<()>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession").field("id", &self.id).finish()
    }
}

impl StreamSession {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// How one STREAMING phase ended.
#[derive(Debug)]
enum Phase {
    Cancelled,
    Finished,
    Exited { reason: String, delivered: usize },
    Failed(SirberusError),
}

#[derive(Debug, Clone, Default)]
pub struct LogStreamer {
    config: StreamerConfig,
}

impl LogStreamer {
    pub fn new(config: StreamerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Start streaming `source` in a background task.
    ///
    /// The session's cancellation scope is a child of `parent`, so server
    /// shutdown ends every open stream.
    pub fn spawn<S>(&self, source: S, request: LogRequest, parent: &CancellationToken) -> StreamSession
    where
        S: LogSource + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = parent.child_token();
        let (lines_tx, lines) = mpsc::channel(self.config.channel_capacity);
        let (errors_tx, errors) = mpsc::channel(self.config.channel_capacity);

        tracing::debug!(
            session = %id,
            entity = %source.entity(),
            lines = request.lines,
            follow = request.follow,
            "Opening log stream"
        );

        let task = tokio::spawn(run_session(
            id,
            source,
            request,
            self.config.clone(),
            cancel.clone(),
            lines_tx,
            errors_tx,
        ));

        StreamSession {
            id,
            lines,
            errors,
            guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }
}

async fn run_session<S: LogSource>(
    id: Uuid,
    mut source: S,
    request: LogRequest,
    config: StreamerConfig,
    cancel: CancellationToken,
    lines_tx: mpsc::Sender<LogLine>,
    errors_tx: mpsc::Sender<SirberusError>,
) {
    let mut backlog = request.lines;
    let mut restarts = 0u32;

    loop {
        // POSITIONING
        let positioned = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            r = position(&mut source, backlog, request.follow) => r,
        };
        let replayed = match positioned {
            Ok(stepped) => stepped,
            Err(e) => {
                tracing::warn!(session = %id, entity = %source.entity(), error = %e, "Failed to open log source");
                report(&cancel, &errors_tx, e).await;
                break;
            }
        };
        let started = Instant::now();

        // STREAMING
        match stream(&mut source, &config, &cancel, &lines_tx, &errors_tx, request.follow).await {
            Phase::Cancelled | Phase::Finished => break,
            Phase::Failed(e) => {
                tracing::warn!(session = %id, entity = %source.entity(), error = %e, "Log stream failed");
                report(&cancel, &errors_tx, e).await;
                break;
            }
            Phase::Exited { reason, delivered } => {
                // RESTARTING
                // Backlog lines are replayed on every attempt and do not count as progress
                let progressed = delivered > replayed || started.elapsed() >= config.stable_run;
                restarts = if progressed { 1 } else { restarts + 1 };
                if restarts > config.max_restarts {
                    tracing::warn!(
                        session = %id,
                        entity = %source.entity(),
                        restarts,
                        "Log source keeps exiting, giving up"
                    );
                    let err = SirberusError::BackendUnavailable(format!(
                        "log source for {} exited {} times in a row: {}",
                        source.entity(),
                        restarts,
                        reason
                    ));
                    report(&cancel, &errors_tx, err).await;
                    break;
                }

                tracing::info!(
                    session = %id,
                    entity = %source.entity(),
                    reason = %reason,
                    attempt = restarts,
                    "Log source exited, restarting"
                );
                source.close().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.restart_delay) => {}
                }
                backlog = request.lines.min(config.restart_lines);
            }
        }
    }

    source.close().await;
    tracing::debug!(session = %id, entity = %source.entity(), "Log stream closed");
    drop(lines_tx);
    drop(errors_tx);
}

/// Open and position the source, returning how many backlog entries precede new ones.
async fn position<S: LogSource>(
    source: &mut S,
    backlog: usize,
    follow: bool,
) -> Result<usize, SirberusError> {
    source.open().await?;
    let stepped = CursorPositioner.position(source, CursorMode::for_lines(backlog));
    source.begin(follow).await?;
    Ok(stepped)
}

async fn stream<S: LogSource>(
    source: &mut S,
    config: &StreamerConfig,
    cancel: &CancellationToken,
    lines_tx: &mpsc::Sender<LogLine>,
    errors_tx: &mpsc::Sender<SirberusError>,
    follow: bool,
) -> Phase {
    let mut delivered = 0usize;

    loop {
        let pulled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Phase::Cancelled,
            r = source.pull() => r,
        };

        match pulled {
            Ok(Pull::Entry(line)) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Phase::Cancelled,
                    sent = lines_tx.send(line) => {
                        if sent.is_err() {
                            return Phase::Cancelled;
                        }
                    }
                }
                delivered += 1;
            }
            Ok(Pull::Idle) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Phase::Cancelled,
                    _ = source.wait_for_data(config.poll_interval) => {}
                }
            }
            Ok(Pull::End) => return Phase::Finished,
            Err(SirberusError::ProcessExited(reason)) if follow => {
                return Phase::Exited { reason, delivered };
            }
            Err(SirberusError::ProcessExited(_)) => return Phase::Finished,
            Err(SirberusError::TransientRead(detail)) => {
                tracing::warn!(entity = %source.entity(), detail = %detail, "Skipping unreadable log entry");
            }
            Err(e) if e.ends_stream() => return Phase::Failed(e),
            Err(e) => {
                tracing::warn!(entity = %source.entity(), error = %e, "Log read error");
                report(cancel, errors_tx, e).await;
            }
        }
    }
}

/// Forward an error to the client unless the session is already gone.
async fn report(
    cancel: &CancellationToken,
    errors_tx: &mpsc::Sender<SirberusError>,
    err: SirberusError,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = errors_tx.send(err) => {}
    }
}
