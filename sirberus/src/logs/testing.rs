//! In-memory log source for exercising positioning and streaming.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::sync::Notify;

use super::{LogLine, LogSource, Pull};

#[derive(Default)]
struct LogState {
    lines: Vec<String>,
    exit_pending: bool,
    crash_loop: bool,
    fail_open: Option<String>,
    pull_errors: VecDeque<SirberusError>,
    opens: usize,
    closes: usize,
}

/// Shared backing store. Clones observe the same lines.
#[derive(Clone)]
pub(crate) struct MemoryLog {
    entity: String,
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
}

impl MemoryLog {
    pub(crate) fn with_lines(entity: &str, lines: &[&str]) -> Self {
        let state = LogState {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        };
        Self {
            entity: entity.to_string(),
            state: Arc::new(Mutex::new(state)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn source(&self) -> MemorySource {
        MemorySource {
            log: self.clone(),
            cursor: 0,
            follow: false,
        }
    }

    pub(crate) fn push(&self, line: &str) {
        self.state.lock().lines.push(line.to_string());
        self.notify.notify_one();
    }

    /// Make the current attempt end as if the producing process died.
    pub(crate) fn exit(&self) {
        self.state.lock().exit_pending = true;
        self.notify.notify_one();
    }

    /// End every attempt once the existing lines have been read.
    pub(crate) fn crash_loop(&self) {
        self.state.lock().crash_loop = true;
        self.notify.notify_one();
    }

    pub(crate) fn fail_open(&self, message: &str) {
        self.state.lock().fail_open = Some(message.to_string());
    }

    pub(crate) fn inject_error(&self, err: SirberusError) {
        self.state.lock().pull_errors.push_back(err);
        self.notify.notify_one();
    }

    pub(crate) fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

pub(crate) struct MemorySource {
    log: MemoryLog,
    cursor: usize,
    follow: bool,
}

#[async_trait]
impl LogSource for MemorySource {
    fn entity(&self) -> &str {
        &self.log.entity
    }

    async fn open(&mut self) -> SirberusResult<()> {
        let mut state = self.log.state.lock();
        state.opens += 1;
        if let Some(message) = state.fail_open.clone() {
            return Err(SirberusError::NotFound(message));
        }
        self.cursor = 0;
        Ok(())
    }

    fn seek_tail(&mut self) {
        self.cursor = self.log.state.lock().lines.len();
    }

    fn step_back(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }

    async fn begin(&mut self, follow: bool) -> SirberusResult<()> {
        self.follow = follow;
        Ok(())
    }

    async fn pull(&mut self) -> SirberusResult<Pull> {
        let mut state = self.log.state.lock();
        if let Some(err) = state.pull_errors.pop_front() {
            return Err(err);
        }
        if let Some(message) = state.lines.get(self.cursor) {
            let line = LogLine::new(format!("ts-{}", self.cursor), message.clone(), &self.log.entity);
            self.cursor += 1;
            return Ok(Pull::Entry(line));
        }
        if state.crash_loop {
            return Err(SirberusError::ProcessExited("memory log crashed".to_string()));
        }
        if state.exit_pending {
            state.exit_pending = false;
            return Err(SirberusError::ProcessExited("memory log exited".to_string()));
        }
        Ok(if self.follow { Pull::Idle } else { Pull::End })
    }

    async fn wait_for_data(&mut self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.log.notify.notified()).await;
    }

    async fn close(&mut self) {
        self.log.state.lock().closes += 1;
    }
}
