//! `journalctl` log source.
//!
//! The journal cursor is realized through the backlog count handed to
//! `journalctl -n`: seeking to the tail resets it, each step back adds one
//! line. `journalctl` itself stops at the beginning of the journal, so a
//! step back always succeeds here.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sirberus_shared::constants::logs::CHANNEL_CAPACITY;
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::logs::{FeedItem, LineFeed, LogLine, LogSource, Pull};

pub struct JournalSource {
    binary: PathBuf,
    unit: String,
    backlog: usize,
    follow: bool,
    child: Option<Child>,
    feed: Option<LineFeed>,
}

impl std::fmt::Debug for JournalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalSource")
            .field("unit", &self.unit)
            .field("backlog", &self.backlog)
            .field("follow", &self.follow)
            .finish()
    }
}

impl JournalSource {
    pub fn new(binary: impl Into<PathBuf>, unit: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            unit: unit.into(),
            backlog: 0,
            follow: false,
            child: None,
            feed: None,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-u")
            .arg(&self.unit)
            .arg("-n")
            .arg(self.backlog.to_string());
        if self.follow {
            cmd.arg("-f");
        }
        cmd.args(["-o", "short-iso", "--no-pager"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn exit_reason(&mut self) -> String {
        match self.child.as_mut() {
            Some(child) => match tokio::time::timeout(Duration::from_secs(1), child.wait()).await {
                Ok(Ok(status)) => format!("journalctl exited with {}", status),
                Ok(Err(e)) => format!("journalctl wait failed: {}", e),
                Err(_) => "journalctl closed its output".to_string(),
            },
            None => "journalctl not running".to_string(),
        }
    }
}

#[async_trait]
impl LogSource for JournalSource {
    fn entity(&self) -> &str {
        &self.unit
    }

    async fn open(&mut self) -> SirberusResult<()> {
        self.close().await;
        self.backlog = 0;
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
        let mut child = self.command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SirberusError::BackendUnavailable(format!(
                    "{} not found: {}",
                    self.binary.display(),
                    e
                ))
            } else {
                SirberusError::Io(e)
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SirberusError::Internal("journalctl stdout not captured".to_string()))?;

        tracing::debug!(
            unit = %self.unit,
            backlog = self.backlog,
            follow,
            pid = ?child.id(),
            "Started journalctl"
        );

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(self.unit.clone(), stderr));
        }

        self.feed = Some(LineFeed::from_reader(CHANNEL_CAPACITY, stdout));
        self.child = Some(child);
        Ok(())
    }

    async fn pull(&mut self) -> SirberusResult<Pull> {
        loop {
            let Some(feed) = self.feed.as_mut() else {
                return Ok(Pull::End);
            };
            match feed.try_next() {
                FeedItem::Line(line) => {
                    if is_framing(&line) {
                        continue;
                    }
                    return parse_journal_line(&line, &self.unit)
                        .map(Pull::Entry)
                        .ok_or_else(|| {
                            SirberusError::TransientRead(format!(
                                "invalid journalctl line format: {}",
                                line
                            ))
                        });
                }
                FeedItem::Error(e) => return Err(e),
                FeedItem::Empty => return Ok(Pull::Idle),
                FeedItem::Closed => {
                    if !self.follow {
                        return Ok(Pull::End);
                    }
                    let reason = self.exit_reason().await;
                    return Err(SirberusError::ProcessExited(reason));
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
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::trace!(unit = %self.unit, error = %e, "journalctl already gone");
            }
            let _ = child.wait().await;
            tracing::debug!(unit = %self.unit, "Stopped journalctl");
        }
    }
}

/// Log whatever journalctl prints on stderr until it exits. Returns the number of lines logged.
async fn forward_stderr<R: AsyncRead + Unpin>(unit: String, stderr: R) -> usize {
    let mut lines = BufReader::new(stderr).lines();
    let mut logged = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                tracing::warn!(unit = %unit, stderr = %line.trim(), "journalctl reported an error");
                logged += 1;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(unit = %unit, error = %e, "Stopped reading journalctl stderr");
                break;
            }
        }
    }
    logged
}

/// `-- No entries --`, `-- Boot ... --` and similar markers.
fn is_framing(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with("-- ")
}

/// Parse a `short-iso` line: `<timestamp> <hostname> <unit>[pid]: <message>`.
///
/// The hostname is dropped when the remainder has at least two words.
pub fn parse_journal_line(line: &str, unit: &str) -> Option<LogLine> {
    let (timestamp, rest) = line.split_once(' ')?;
    if timestamp.is_empty() {
        return None;
    }
    let rest = rest.trim();
    let message = match rest.split_once(' ') {
        Some((_host, message)) => message,
        None => rest,
    };
    Some(LogLine::new(timestamp, message, unit))
}
