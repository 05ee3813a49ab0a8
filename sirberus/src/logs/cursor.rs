//! Read-cursor placement for log sources.

use super::LogSource;

/// Where to leave the cursor before forward iteration starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// The last `n` entries, fewer if the source is shorter.
    Historical(usize),
    /// Only entries written from now on, plus the newest existing one.
    Follow,
}

impl CursorMode {
    /// Mode for a request asking for `lines` of backlog.
    pub fn for_lines(lines: usize) -> Self {
        if lines == 0 {
            CursorMode::Follow
        } else {
            CursorMode::Historical(lines)
        }
    }
}

/// Positions a source's cursor relative to its tail.
#[derive(Debug, Default, Clone, Copy)]
pub struct CursorPositioner;

impl CursorPositioner {
    /// Position `source` and return how many entries the cursor moved back.
    ///
    /// Reaching the beginning of the source early is a normal boundary, not an error.
    pub fn position<S: LogSource + ?Sized>(&self, source: &mut S, mode: CursorMode) -> usize {
        source.seek_tail();

        match mode {
            CursorMode::Historical(n) => {
                let mut stepped = 0;
                while stepped < n && source.step_back() {
                    stepped += 1;
                }
                if stepped < n {
                    tracing::debug!(
                        entity = %source.entity(),
                        requested = n,
                        available = stepped,
                        "Reached beginning of log before requested line count"
                    );
                }
                stepped
            }
            CursorMode::Follow => {
                if source.step_back() {
                    1
                } else {
                    tracing::debug!(entity = %source.entity(), "Log is empty, following from start");
                    0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::testing::MemoryLog;
    use crate::logs::{LogSource, Pull};

    async fn drain(source: &mut impl LogSource) -> Vec<String> {
        source.begin(false).await.unwrap();
        let mut out = Vec::new();
        while let Pull::Entry(line) = source.pull().await.unwrap() {
            out.push(line.message);
        }
        out
    }

    #[tokio::test]
    async fn test_historical_returns_last_n() {
        let log = MemoryLog::with_lines("svc", &["a", "b", "c", "d", "e"]);
        let mut source = log.source();
        source.open().await.unwrap();

        let moved = CursorPositioner.position(&mut source, CursorMode::Historical(2));
        assert_eq!(moved, 2);
        assert_eq!(drain(&mut source).await, vec!["d", "e"]);
    }

    #[tokio::test]
    async fn test_historical_stops_at_beginning_without_error() {
        let log = MemoryLog::with_lines("svc", &["a", "b", "c"]);
        let mut source = log.source();
        source.open().await.unwrap();

        let moved = CursorPositioner.position(&mut source, CursorMode::Historical(5));
        assert_eq!(moved, 3);
        assert_eq!(drain(&mut source).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_follow_steps_back_once() {
        let log = MemoryLog::with_lines("svc", &["old", "newest"]);
        let mut source = log.source();
        source.open().await.unwrap();

        assert_eq!(CursorPositioner.position(&mut source, CursorMode::Follow), 1);
        assert_eq!(drain(&mut source).await, vec!["newest"]);
    }

    #[tokio::test]
    async fn test_follow_on_empty_source() {
        let log = MemoryLog::with_lines("svc", &[]);
        let mut source = log.source();
        source.open().await.unwrap();

        assert_eq!(CursorPositioner.position(&mut source, CursorMode::Follow), 0);
        assert!(drain(&mut source).await.is_empty());
    }

    #[test]
    fn test_mode_for_lines() {
        assert_eq!(CursorMode::for_lines(0), CursorMode::Follow);
        assert_eq!(CursorMode::for_lines(10), CursorMode::Historical(10));
    }
}
