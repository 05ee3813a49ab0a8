//! Periodic snapshot producers for live status streams.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{EventKind, IntoEvent, SseEvent};

/// A serializable value sent as a `message` event with JSON content.
#[derive(Debug, Clone)]
pub struct Snapshot<T>(pub T);

impl<T: Serialize + Send> IntoEvent for Snapshot<T> {
    fn into_event(self) -> SseEvent {
        match serde_json::to_string(&self.0) {
            Ok(json) => SseEvent::new(EventKind::Message, json),
            Err(e) => SseEvent::error(&SirberusError::Internal(format!(
                "failed to encode snapshot: {}",
                e
            ))),
        }
    }
}

/// Channels of a running snapshot loop.
pub struct SnapshotStream<T> {
    pub items: mpsc::Receiver<Snapshot<T>>,
    pub errors: mpsc::Receiver<SirberusError>,
    pub task: JoinHandle<()>,
}

/// Call `fetch` immediately and then every `interval` until cancelled.
///
/// A failed fetch is reported on the error channel. NotFound and
/// BackendUnavailable also end the loop; other errors are retried on the
/// next tick.
pub fn spawn_snapshot_stream<T, F, Fut>(
    mut fetch: F,
    interval: Duration,
    cancel: CancellationToken,
    capacity: usize,
) -> SnapshotStream<T>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = SirberusResult<T>> + Send,
{
    let (items_tx, items) = mpsc::channel(capacity);
    let (errors_tx, errors) = mpsc::channel(capacity);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = fetch() => r,
            };

            match fetched {
                Ok(value) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = items_tx.send(Snapshot(value)) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    let terminal = e.ends_stream();
                    tracing::warn!(error = %e, terminal, "Snapshot fetch failed");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = errors_tx.send(e) => {}
                    }
                    if terminal {
                        break;
                    }
                }
            }
        }
    });

    SnapshotStream {
        items,
        errors,
        task,
    }
}
