//! Bridge from producer channels to an axum SSE response.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::Sse;
use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use sirberus_shared::constants::logs::CHANNEL_CAPACITY;
use sirberus_shared::errors::SirberusError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::events::{EventPublisher, IntoEvent};

/// Publish `output` and `errors` as an event stream.
///
/// The publisher runs in its own task and owns `keep`, which is dropped when
/// publishing stops. Passing a producer's drop guard there ties the producer's
/// lifetime to the client connection.
pub(crate) fn event_stream<T, K>(
    output: mpsc::Receiver<T>,
    errors: mpsc::Receiver<SirberusError>,
    cancel: CancellationToken,
    heartbeat: Duration,
    keep: K,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: IntoEvent + 'static,
    K: Send + 'static,
{
    let (sink_tx, sink_rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let outcome = EventPublisher::new(heartbeat)
            .publish(output, errors, cancel, sink_tx)
            .await;
        tracing::debug!(outcome = ?outcome, "Event stream finished");
        drop(keep);
    });

    Sse::new(ReceiverStream::new(sink_rx).map(|ev| Ok::<_, Infallible>(Event::from(ev))))
}
