//! systemd service backend.
//!
//! ## Architecture
//!
//! - **ServiceManager**: trait over the service manager (list, properties, jobs)
//! - **SystemctlManager**: `systemctl` subprocess implementation
//! - **ServiceCatalog**: assembles list and detail snapshots, including CPU and memory
//! - **JournalSource**: `journalctl` log source for the streamer

mod journal;
mod properties;
mod service;
mod systemctl;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use sirberus_shared::constants::systemd::SERVICE_SUFFIX;
use sirberus_shared::errors::{SirberusError, SirberusResult};

pub use journal::{JournalSource, parse_journal_line};
pub use properties::{PropertyValue, UnitProperties, format_uuid};
pub use service::{ServiceCatalog, ServiceDetails, ServiceSummary};
pub use systemctl::SystemctlManager;

/// One row of the unit listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOperation {
    Start,
    Stop,
    Restart,
}

impl UnitOperation {
    pub fn verb(&self) -> &'static str {
        match self {
            UnitOperation::Start => "start",
            UnitOperation::Stop => "stop",
            UnitOperation::Restart => "restart",
        }
    }

    /// Past tense used in success messages.
    pub fn past_tense(&self) -> &'static str {
        match self {
            UnitOperation::Start => "started",
            UnitOperation::Stop => "stopped",
            UnitOperation::Restart => "restarted",
        }
    }
}

impl fmt::Display for UnitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Outcome reported by the service manager for a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub result: String,
    pub detail: Option<String>,
}

/// Access to the host service manager.
///
/// Implementations apply their own timeout to every call; a timeout is
/// reported as `SirberusError::Timeout` and not retried.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// All service units, in any state.
    async fn list_units(&self) -> SirberusResult<Vec<UnitSummary>>;

    /// Properties of one unit. Unknown units are `NotFound`.
    async fn unit_properties(&self, name: &str) -> SirberusResult<UnitProperties>;

    /// Run a start, stop or restart job and wait for its result.
    async fn run_job(&self, name: &str, op: UnitOperation) -> SirberusResult<JobResult>;
}

/// Append `.service` to a bare unit name.
pub fn service_name(name: &str) -> String {
    if name.ends_with(SERVICE_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, SERVICE_SUFFIX)
    }
}

/// Reject names that could be read as options or escape the unit namespace.
pub fn validate_unit_name(name: &str) -> SirberusResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@' | ':' | '\\'));
    if valid {
        Ok(())
    } else {
        Err(SirberusError::InvalidArgument(format!(
            "invalid unit name: {:?}",
            name
        )))
    }
}
