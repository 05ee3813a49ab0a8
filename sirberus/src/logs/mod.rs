//! Continuous log retrieval.
//!
//! ## Architecture
//!
//! - **LogSource**: capability trait implemented once per backend (journal, container runtime)
//! - **CursorPositioner**: places the read cursor for "last N lines" or "follow" requests
//! - **LogStreamer**: runs one background task per session, restarting the source when it exits
//! - **StreamSession**: the caller's handle, owning the channels and the cancellation scope

mod cursor;
mod feed;
mod streamer;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sirberus_shared::constants::logs::DEFAULT_LINES;
use sirberus_shared::errors::SirberusResult;

pub use cursor::{CursorMode, CursorPositioner};
pub use feed::{FeedItem, LineFeed, LineSplitter};
pub use streamer::{LogStreamer, StreamSession, StreamerConfig};

/// One parsed log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub timestamp: String,
    pub message: String,
    pub source_entity: String,
}

impl LogLine {
    pub fn new(
        timestamp: impl Into<String>,
        message: impl Into<String>,
        source_entity: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            message: message.into(),
            source_entity: source_entity.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.timestamp, self.message)
    }
}

/// What the client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRequest {
    /// Historical lines to replay before new ones.
    pub lines: usize,
    /// Keep streaming after the backlog is exhausted.
    pub follow: bool,
}

impl Default for LogRequest {
    fn default() -> Self {
        Self {
            lines: DEFAULT_LINES,
            follow: true,
        }
    }
}

/// Result of a non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    Entry(LogLine),
    /// Nothing available right now; call `wait_for_data` and retry.
    Idle,
    /// The source is exhausted and will not produce more entries.
    End,
}

/// A positionable, followable log source.
///
/// Lifecycle per attempt: `open`, positioning through `seek_tail` and
/// `step_back`, `begin`, then `pull`/`wait_for_data` until done, then `close`.
/// The streamer may run several attempts on the same source after an
/// unexpected exit, so `open` must reset any state from a previous attempt.
///
/// `pull` reports an unexpected end of the underlying process or session as
/// `SirberusError::ProcessExited`; read failures that leave the session usable
/// as `SirberusError::TransientRead`.
#[async_trait]
pub trait LogSource: Send {
    /// Name of the unit or container the lines belong to.
    fn entity(&self) -> &str;

    /// Prepare a new attempt.
    async fn open(&mut self) -> SirberusResult<()>;

    /// Move the cursor past the newest entry.
    fn seek_tail(&mut self);

    /// Move the cursor back by one entry. Returns false at the beginning.
    fn step_back(&mut self) -> bool;

    /// Start forward iteration from the cursor.
    async fn begin(&mut self, follow: bool) -> SirberusResult<()>;

    /// Fetch the next entry without blocking.
    async fn pull(&mut self) -> SirberusResult<Pull>;

    /// Wait up to `timeout` for new data. A timeout is not an error.
    async fn wait_for_data(&mut self, timeout: Duration);

    /// Release the underlying process or session.
    async fn close(&mut self);
}
