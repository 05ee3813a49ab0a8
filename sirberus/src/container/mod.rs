//! Container runtime backend.
//!
//! ## Architecture
//!
//! - **ContainerRuntime**: trait over the runtime API (list, inspect, stats, actions, logs, exec)
//! - **DockerRuntime**: Docker Engine API implementation, also used for Podman's compatible socket
//! - **ContainerCatalog**: list and detail snapshots, including CPU and memory
//! - **ContainerLogSource**: runtime log stream as a `LogSource`
//! - **exec**: drives an exec session into output and error channels

mod catalog;
mod docker;
pub mod exec;
mod logs;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use sirberus_shared::constants::container::SHORT_ID_LEN;
use sirberus_shared::errors::SirberusResult;

pub use catalog::{ContainerCatalog, ContainerDetails, ContainerSummary, format_ports};
pub use docker::{DockerRuntime, discover_host};
pub use logs::{ContainerLogSource, parse_container_line};

/// A port as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub ip: Option<String>,
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: String,
}

/// One row of the runtime's container listing.
#[derive(Debug, Clone, Default)]
pub struct ContainerEntry {
    pub id: String,
    pub image: String,
    pub status: String,
    pub ports: Vec<PortMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub source: String,
    pub destination: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub ip_address: String,
    pub gateway: String,
    pub mac_address: String,
}

/// Inspect data for one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerInspect {
    pub id: String,
    pub name: String,
    pub image: String,
    pub path: String,
    pub args: Vec<String>,
    pub created: String,
    pub state: String,
    pub running: bool,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub restart_count: i64,
    pub platform: String,
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<MountInfo>,
    pub networks: BTreeMap<String, NetworkInfo>,
    pub ports: Vec<PortMapping>,
}

/// Raw resource counters of a running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    /// Cumulative CPU time in nanoseconds.
    pub cpu_total_ns: u64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOperation {
    Start,
    Stop,
    Restart,
}

impl ContainerOperation {
    pub fn verb(&self) -> &'static str {
        match self {
            ContainerOperation::Start => "start",
            ContainerOperation::Stop => "stop",
            ContainerOperation::Restart => "restart",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ContainerOperation::Start => "started",
            ContainerOperation::Stop => "stopped",
            ContainerOperation::Restart => "restarted",
        }
    }
}

impl fmt::Display for ContainerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Chunks of text as produced by the runtime; a chunk may hold several lines.
pub type TextStream = BoxStream<'static, SirberusResult<String>>;

/// An attached exec instance.
pub struct ExecAttach {
    pub exec_id: String,
    pub output: TextStream,
}

/// Access to a container runtime.
///
/// Unknown containers are reported as `NotFound`, an unreachable runtime as
/// `BackendUnavailable`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list(&self) -> SirberusResult<Vec<ContainerEntry>>;

    async fn inspect(&self, id: &str) -> SirberusResult<ContainerInspect>;

    async fn stats(&self, id: &str) -> SirberusResult<ContainerStats>;

    async fn apply(&self, id: &str, op: ContainerOperation) -> SirberusResult<()>;

    /// Log output with RFC 3339 timestamps, the last `tail` lines first.
    async fn logs(&self, id: &str, tail: usize, follow: bool) -> SirberusResult<TextStream>;

    async fn exec(&self, id: &str, cmd: Vec<String>) -> SirberusResult<ExecAttach>;

    /// Exit code of a finished exec, `None` while it is still running.
    async fn exec_exit_code(&self, exec_id: &str) -> SirberusResult<Option<i64>>;
}

/// First twelve characters of a container id.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
