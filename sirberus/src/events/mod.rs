//! Typed server-sent events.
//!
//! Producers (log sessions, snapshot loops, exec sessions) hand items that
//! implement [`IntoEvent`] to the [`EventPublisher`], which interleaves
//! heartbeats and errors and writes [`SseEvent`]s to the client sink.

mod publisher;
mod snapshot;

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sirberus_shared::errors::SirberusError;

use crate::logs::LogLine;

pub use publisher::{EventPublisher, PublishOutcome};
pub use snapshot::{Snapshot, SnapshotStream, spawn_snapshot_stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Log,
    Error,
    Heartbeat,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Log => "log",
            EventKind::Error => "error",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed event: `event: <kind>` followed by `data: <content>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub kind: EventKind,
    pub content: String,
}

impl SseEvent {
    pub fn new(kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn error(err: &SirberusError) -> Self {
        Self::new(EventKind::Error, err.to_string())
    }

    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        Self::new(
            EventKind::Heartbeat,
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }
}

impl From<SseEvent> for axum::response::sse::Event {
    fn from(ev: SseEvent) -> Self {
        axum::response::sse::Event::default()
            .event(ev.kind.as_str())
            .data(ev.content.replace('\r', ""))
    }
}

/// Conversion of a produced item into its wire event.
pub trait IntoEvent: Send {
    fn into_event(self) -> SseEvent;
}

impl IntoEvent for LogLine {
    fn into_event(self) -> SseEvent {
        SseEvent::new(EventKind::Log, self.to_string())
    }
}

impl IntoEvent for SseEvent {
    fn into_event(self) -> SseEvent {
        self
    }
}
