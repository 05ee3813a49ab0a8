//! Multiplexes producer output, errors and heartbeats onto one event sink.

use std::time::Duration;

use chrono::Utc;
use sirberus_shared::constants::events::LOG_HEARTBEAT;
use sirberus_shared::errors::SirberusError;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{IntoEvent, SseEvent};

/// Why publishing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The producer closed its output channel.
    Completed,
    /// The cancellation scope was cancelled.
    Cancelled,
    /// The client went away; the scope has been cancelled.
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
pub struct EventPublisher {
    heartbeat: Duration,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(LOG_HEARTBEAT)
    }
}

impl EventPublisher {
    pub fn new(heartbeat: Duration) -> Self {
        Self { heartbeat }
    }

    /// Drain `output` and `errors` into `sink` until one side goes away.
    ///
    /// Errors are emitted as `error` events and do not stop publishing; a
    /// producer that must end the stream closes its output channel after
    /// sending the error. Heartbeats start one interval after the call.
    pub async fn publish<T: IntoEvent>(
        &self,
        mut output: mpsc::Receiver<T>,
        mut errors: mpsc::Receiver<SirberusError>,
        cancel: CancellationToken,
        sink: mpsc::Sender<SseEvent>,
    ) -> PublishOutcome {
        let mut heartbeat = tokio::time::interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut errors_open = true;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PublishOutcome::Cancelled,
                _ = sink.closed() => {
                    tracing::debug!("Event stream client disconnected");
                    cancel.cancel();
                    return PublishOutcome::Disconnected;
                }
                item = output.recv() => match item {
                    Some(item) => item.into_event(),
                    None => {
                        while let Ok(err) = errors.try_recv() {
                            if let Err(outcome) = emit(&sink, &cancel, SseEvent::error(&err)).await {
                                return outcome;
                            }
                        }
                        return PublishOutcome::Completed;
                    }
                },
                err = errors.recv(), if errors_open => match err {
                    Some(err) => {
                        tracing::debug!(error = %err, "Forwarding stream error");
                        SseEvent::error(&err)
                    }
                    None => {
                        errors_open = false;
                        continue;
                    }
                },
                _ = heartbeat.tick() => SseEvent::heartbeat(Utc::now()),
            };

            if let Err(outcome) = emit(&sink, &cancel, event).await {
                return outcome;
            }
        }
    }
}

async fn emit(
    sink: &mpsc::Sender<SseEvent>,
    cancel: &CancellationToken,
    event: SseEvent,
) -> Result<(), PublishOutcome> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PublishOutcome::Cancelled),
        sent = sink.send(event) => sent.map_err(|_| {
            cancel.cancel();
            PublishOutcome::Disconnected
        }),
    }
}
