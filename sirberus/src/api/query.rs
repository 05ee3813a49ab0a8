//! Query parameters of the log streaming routes.

use serde::Deserialize;
use sirberus_shared::constants::logs::{DEFAULT_LINES, MAX_LINES};

use crate::logs::LogRequest;

/// `?lines=<n>&follow=<bool>`, kept as raw strings so bad values fall back
/// to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub lines: Option<String>,
    pub follow: Option<String>,
}

impl LogQuery {
    pub fn lines(&self) -> usize {
        let Some(raw) = self.lines.as_deref() else {
            return DEFAULT_LINES;
        };
        match raw.trim().parse::<i64>() {
            Ok(n) if n > 0 => (n as u64).min(MAX_LINES as u64) as usize,
            _ => {
                tracing::warn!(value = %raw, default = DEFAULT_LINES, "Invalid lines parameter, using default");
                DEFAULT_LINES
            }
        }
    }

    /// Only the literal `false` turns following off.
    pub fn follow(&self) -> bool {
        self.follow.as_deref() != Some("false")
    }

    pub fn request(&self) -> LogRequest {
        LogRequest {
            lines: self.lines(),
            follow: self.follow(),
        }
    }

    /// Same as [`LogQuery::request`] but always following.
    pub fn follow_request(&self) -> LogRequest {
        LogRequest {
            lines: self.lines(),
            follow: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(lines: Option<&str>, follow: Option<&str>) -> LogQuery {
        LogQuery {
            lines: lines.map(str::to_string),
            follow: follow.map(str::to_string),
        }
    }

    #[test]
    fn test_lines_defaults_and_fallbacks() {
        assert_eq!(query(None, None).lines(), 100);
        assert_eq!(query(Some("25"), None).lines(), 25);
        assert_eq!(query(Some("abc"), None).lines(), 100);
        assert_eq!(query(Some("0"), None).lines(), 100);
        assert_eq!(query(Some("-3"), None).lines(), 100);
        assert_eq!(query(Some("999999"), None).lines(), MAX_LINES);
    }

    #[test]
    fn test_follow_flag() {
        assert!(query(None, None).follow());
        assert!(query(None, Some("true")).follow());
        assert!(query(None, Some("no")).follow());
        assert!(!query(None, Some("false")).follow());
        assert!(query(Some("5"), Some("false")).follow_request().follow);
    }
}
