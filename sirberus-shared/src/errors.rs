//! Error taxonomy for service, container and streaming operations.

use std::time::Duration;
use thiserror::Error;

/// Result alias used across Sirberus crates.
pub type SirberusResult<T> = Result<T, SirberusError>;

#[derive(Debug, Error)]
pub enum SirberusError {
    /// The requested unit, container or exec session does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The service manager or container runtime cannot be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single read failed; the underlying session is still usable.
    #[error("transient read error: {0}")]
    TransientRead(String),

    /// The log-producing process or session ended without being cancelled.
    #[error("log source exited: {0}")]
    ProcessExited(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A backend accepted the request but reported failure.
    #[error("{0}")]
    OperationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SirberusError {
    /// Whether a streaming session must close after reporting this error.
    pub fn ends_stream(&self) -> bool {
        matches!(
            self,
            SirberusError::NotFound(_) | SirberusError::BackendUnavailable(_)
        )
    }

    /// Whether the error is absorbed by the component that detected it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SirberusError::TransientRead(_) | SirberusError::ProcessExited(_)
        )
    }
}
