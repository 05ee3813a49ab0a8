//! Container runtime log source.
//!
//! The runtime's `tail` parameter plays the role of the cursor: seeking to
//! the tail resets it and each step back widens it by one line.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use sirberus_shared::constants::logs::CHANNEL_CAPACITY;
use sirberus_shared::errors::{SirberusError, SirberusResult};

use super::ContainerRuntime;
use crate::logs::{FeedItem, LineFeed, LogLine, LogSource, Pull};

pub struct ContainerLogSource {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    backlog: usize,
    follow: bool,
    feed: Option<LineFeed>,
}

impl std::fmt::Debug for ContainerLogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerLogSource")
            .field("id", &self.id)
            .field("backlog", &self.backlog)
            .field("follow", &self.follow)
            .finish()
    }
}

impl ContainerLogSource {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, id: impl Into<String>) -> Self {
        Self {
            runtime,
            id: id.into(),
            backlog: 0,
            follow: false,
            feed: None,
        }
    }
}

#[async_trait]
impl LogSource for ContainerLogSource {
    fn entity(&self) -> &str {
        &self.id
    }

    async fn open(&mut self) -> SirberusResult<()> {
        self.close().await;
        self.backlog = 0;
        self.runtime.inspect(&self.id).await?;
        Ok(())
    }

    fn seek_tail(&mut self) {
        self.backlog = 0;
    }

    fn step_back(&mut self) -> bool {
        self.backlog += 1;
        true
    }

    async fn begin(&mut self, follow: bool) -> SirberusResult<()> {
        self.follow = follow;
        let chunks = self.runtime.logs(&self.id, self.backlog, follow).await?;
        tracing::debug!(container = %self.id, backlog = self.backlog, follow, "Attached to container logs");
        self.feed = Some(LineFeed::from_chunks(CHANNEL_CAPACITY, chunks));
        Ok(())
    }

    async fn pull(&mut self) -> SirberusResult<Pull> {
        let Some(feed) = self.feed.as_mut() else {
            return Ok(Pull::End);
        };
        match feed.try_next() {
            FeedItem::Line(line) => Ok(Pull::Entry(parse_container_line(&line, &self.id))),
            FeedItem::Error(e) => Err(e),
            FeedItem::Empty => Ok(Pull::Idle),
            FeedItem::Closed => {
                if !self.follow {
                    return Ok(Pull::End);
                }
                // A stopped container ends its log stream normally
                let inspect = self.runtime.inspect(&self.id).await?;
                if inspect.running {
                    Err(SirberusError::ProcessExited(
                        "log stream closed while container is running".to_string(),
                    ))
                } else {
                    tracing::debug!(container = %self.id, state = %inspect.state, "Container stopped, ending log stream");
                    Ok(Pull::End)
                }
            }
        }
    }

    async fn wait_for_data(&mut self, timeout: Duration) {
        match self.feed.as_mut() {
            Some(feed) => feed.wait(timeout).await,
            None => tokio::time::sleep(timeout).await,
        }
    }

    async fn close(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
    }
}

/// Split a timestamped runtime line into `<RFC 3339 timestamp> <message>`.
///
/// Lines without a leading timestamp keep their full text as the message.
pub fn parse_container_line(line: &str, id: &str) -> LogLine {
    match line.split_once(' ') {
        Some((ts, message)) if DateTime::parse_from_rfc3339(ts).is_ok() => {
            LogLine::new(ts, message, id)
        }
        _ => LogLine::new("", line, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::catalog::tests::{FakeRuntime, web_container};
    use crate::logs::{LogRequest, LogStreamer};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_parse_container_line() {
        let line = parse_container_line("2024-05-01T10:00:00.123456789Z GET / 200", "web");
        assert_eq!(line.timestamp, "2024-05-01T10:00:00.123456789Z");
        assert_eq!(line.message, "GET / 200");
        assert_eq!(line.source_entity, "web");

        let bare = parse_container_line("no timestamp here", "web");
        assert_eq!(bare.timestamp, "");
        assert_eq!(bare.message, "no timestamp here");
    }

    #[tokio::test]
    async fn test_streams_backlog_without_follow() {
        let runtime = FakeRuntime {
            log_chunks: vec![
                "2024-05-01T10:00:00Z starting\n2024-05-01T10:00:01Z ".to_string(),
                "ready\n".to_string(),
            ],
            ..Default::default()
        }
        .with_container(web_container());

        let source = ContainerLogSource::new(Arc::new(runtime), "web");
        let mut session = LogStreamer::default().spawn(
            source,
            LogRequest { lines: 10, follow: false },
            &CancellationToken::new(),
        );

        let mut got = Vec::new();
        while let Some(line) = session.lines.recv().await {
            got.push(line.to_string());
        }
        assert_eq!(
            got,
            vec!["2024-05-01T10:00:00Z: starting", "2024-05-01T10:00:01Z: ready"]
        );
        assert!(session.errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_follow_ends_when_container_stopped() {
        let mut stopped = web_container();
        stopped.running = false;
        stopped.state = "exited".to_string();
        let runtime = FakeRuntime {
            log_chunks: vec!["2024-05-01T10:00:00Z bye\n".to_string()],
            ..Default::default()
        }
        .with_container(stopped);

        let mut session = LogStreamer::default().spawn(
            ContainerLogSource::new(Arc::new(runtime), "web"),
            LogRequest { lines: 1, follow: true },
            &CancellationToken::new(),
        );
        let line = session.lines.recv().await.unwrap();
        assert_eq!(line.message, "bye");
        assert!(session.lines.recv().await.is_none());
        assert!(session.errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_container_reports_not_found() {
        let mut session = LogStreamer::default().spawn(
            ContainerLogSource::new(Arc::new(FakeRuntime::default()), "ghost"),
            LogRequest::default(),
            &CancellationToken::new(),
        );
        let err = session.errors.recv().await.unwrap();
        assert!(matches!(err, SirberusError::NotFound(_)));
        assert!(session.lines.recv().await.is_none());
    }
}
