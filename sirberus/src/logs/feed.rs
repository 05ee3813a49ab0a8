//! Channel-backed line buffer for sources that read in a helper task.
//!
//! Journal and container sources both receive raw lines from a producer task
//! (a subprocess pipe or a runtime log stream). `LineFeed` turns that into the
//! non-blocking pull plus bounded wait that `LogSource` needs.

use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

/// Reassembles lines from text chunks that may split or join them.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    /// Append `chunk` and return every line it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let line = self.partial[..pos].trim_end_matches('\r').to_string();
            self.partial.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    /// Trailing text without a newline, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        let rest = rest.trim_end_matches('\r');
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Next item from a feed.
#[derive(Debug)]
pub enum FeedItem {
    Line(String),
    Error(SirberusError),
    /// Producer is alive but has nothing buffered.
    Empty,
    /// Producer finished and everything was consumed.
    Closed,
}

pub struct LineFeed {
    rx: mpsc::Receiver<SirberusResult<String>>,
    pending: Option<SirberusResult<String>>,
    closed: bool,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for LineFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFeed")
            .field("closed", &self.closed)
            .finish()
    }
}

impl LineFeed {
    /// Run `producer` in a task; it sends lines until done and then returns.
    pub fn spawn<F, Fut>(capacity: usize, producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<SirberusResult<String>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(producer(tx));
        Self {
            rx,
            pending: None,
            closed: false,
            task,
        }
    }

    /// Feed the newline-separated lines of `reader`. Invalid UTF-8 is replaced.
    pub fn from_reader<R>(capacity: usize, reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::spawn(capacity, |tx| async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']).to_string();
                        if tx.send(Ok(line)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(SirberusError::TransientRead(e.to_string())))
                            .await;
                        break;
                    }
                }
            }
        })
    }

    /// Feed the lines carried by a stream of text chunks.
    ///
    /// A stream error is forwarded as `TransientRead` and ends the feed.
    pub fn from_chunks<S>(capacity: usize, chunks: S) -> Self
    where
        S: Stream<Item = SirberusResult<String>> + Send + Unpin + 'static,
    {
        Self::spawn(capacity, |tx| async move {
            let mut chunks = chunks;
            let mut splitter = LineSplitter::default();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(text) => {
                        for line in splitter.push(&text) {
                            if tx.send(Ok(line)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(SirberusError::TransientRead(e.to_string())))
                            .await;
                        return;
                    }
                }
            }
            if let Some(rest) = splitter.finish() {
                let _ = tx.send(Ok(rest)).await;
            }
        })
    }

    pub fn try_next(&mut self) -> FeedItem {
        let item = match self.pending.take() {
            Some(item) => item,
            None => match self.rx.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) => return FeedItem::Empty,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    return FeedItem::Closed;
                }
            },
        };
        match item {
            Ok(line) => FeedItem::Line(line),
            Err(e) => FeedItem::Error(e),
        }
    }

    /// Wait up to `timeout` for the next item without consuming it.
    pub async fn wait(&mut self, timeout: Duration) {
        if self.pending.is_some() || self.closed {
            return;
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(item)) => self.pending = Some(item),
            Ok(None) => self.closed = true,
            Err(_) => {}
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for LineFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}
