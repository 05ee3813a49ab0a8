//! Container list and detail snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use sirberus_shared::constants::container::LIST_CONCURRENCY;
use sirberus_shared::errors::{SirberusError, SirberusResult};

use super::{
    ContainerInspect, ContainerOperation, ContainerRuntime, MountInfo, NetworkInfo, PortMapping,
    short_id,
};
use crate::metrics::{CpuCounter, CpuPercent, MetricSampler, ResourceReading};

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub command: String,
    pub created: String,
    pub status: String,
    pub state: String,
    pub ports: String,
    pub cpu_percent: CpuPercent,
    pub memory_bytes: u64,
    pub uptime_seconds: u64,
    pub is_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerDetails {
    #[serde(flatten)]
    pub summary: ContainerSummary,
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<MountInfo>,
    pub networks: BTreeMap<String, NetworkInfo>,
    pub started_at: String,
    pub finished_at: String,
    pub restart_count: i64,
    pub platform: String,
}

/// Render ports the way `docker ps` does: `ip:public->private/proto` for
/// published ports, `private/proto` otherwise.
pub fn format_ports(ports: &[PortMapping]) -> String {
    ports
        .iter()
        .map(|p| match p.public_port {
            Some(public) if public != 0 => format!(
                "{}:{}->{}/{}",
                p.ip.as_deref().unwrap_or_default(),
                public,
                p.private_port,
                p.protocol
            ),
            _ => format!("{}/{}", p.private_port, p.protocol),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds container snapshots from the runtime, sampling CPU per full id.
#[derive(Clone)]
pub struct ContainerCatalog {
    runtime: Arc<dyn ContainerRuntime>,
    sampler: MetricSampler,
}

impl std::fmt::Debug for ContainerCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerCatalog")
            .field("sampler", &self.sampler)
            .finish()
    }
}

impl ContainerCatalog {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, sampler: MetricSampler) -> Self {
        Self { runtime, sampler }
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    /// Check that the container exists and return its full id.
    pub async fn resolve(&self, id: &str) -> SirberusResult<String> {
        validate_container_id(id)?;
        Ok(self.runtime.inspect(id).await?.id)
    }

    /// All containers, running or not.
    ///
    /// A container that disappears between listing and inspection is skipped.
    pub async fn list(&self) -> SirberusResult<Vec<ContainerSummary>> {
        let entries = self.runtime.list().await?;
        let summaries = futures::stream::iter(entries)
            .map(|entry| async move {
                let inspect = match self.runtime.inspect(&entry.id).await {
                    Ok(inspect) => inspect,
                    Err(e) => {
                        tracing::warn!(container = %short_id(&entry.id), error = %e, "Failed to inspect container");
                        return None;
                    }
                };
                let mut summary = self.summarize(&inspect, Utc::now()).await;
                summary.image = entry.image;
                summary.status = entry.status;
                summary.ports = format_ports(&entry.ports);
                Some(summary)
            })
            .buffered(LIST_CONCURRENCY)
            .filter_map(|s| async move { s })
            .collect::<Vec<_>>()
            .await;
        Ok(summaries)
    }

    pub async fn details(&self, id: &str) -> SirberusResult<ContainerDetails> {
        validate_container_id(id)?;
        let inspect = self.runtime.inspect(id).await?;
        let summary = self.summarize(&inspect, Utc::now()).await;
        Ok(ContainerDetails {
            summary,
            env: inspect.env,
            labels: inspect.labels,
            mounts: inspect.mounts,
            networks: inspect.networks,
            started_at: inspect.started_at.unwrap_or_default(),
            finished_at: inspect.finished_at.unwrap_or_default(),
            restart_count: inspect.restart_count,
            platform: inspect.platform,
        })
    }

    /// Apply `op` and return the success message.
    pub async fn run(&self, id: &str, op: ContainerOperation) -> SirberusResult<String> {
        let full_id = self.resolve(id).await?;
        self.runtime.apply(&full_id, op).await?;
        tracing::info!(container = %short_id(&full_id), operation = %op, "Container operation completed");
        Ok(format!("Container {} {} successfully", id, op.past_tense()))
    }

    async fn summarize(&self, inspect: &ContainerInspect, now: DateTime<Utc>) -> ContainerSummary {
        let started_at = inspect
            .started_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        let (reading, uptime_seconds) = if inspect.running {
            let reading = self.sample(inspect, started_at, now).await;
            let uptime = started_at
                .map(|s| (now - s).num_seconds().max(0) as u64)
                .unwrap_or(0);
            (reading, uptime)
        } else {
            (ResourceReading::unavailable(), 0)
        };

        ContainerSummary {
            id: short_id(&inspect.id).to_string(),
            name: inspect.name.trim_start_matches('/').to_string(),
            image: inspect.image.clone(),
            command: format!("{} {}", inspect.path, inspect.args.join(" "))
                .trim()
                .to_string(),
            created: inspect.created.clone(),
            status: inspect.state.clone(),
            state: inspect.state.clone(),
            ports: format_ports(&inspect.ports),
            cpu_percent: reading.cpu_percent,
            memory_bytes: reading.memory_bytes,
            uptime_seconds,
            is_running: inspect.running,
        }
    }

    async fn sample(
        &self,
        inspect: &ContainerInspect,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ResourceReading {
        let stats = self.runtime.stats(&inspect.id).await;
        let memory = stats.as_ref().map(|s| s.memory_bytes).unwrap_or(0);
        let counter = || -> SirberusResult<CpuCounter> {
            match &stats {
                Ok(s) => Ok(CpuCounter::nanos(s.cpu_total_ns)),
                Err(e) => Err(SirberusError::TransientRead(e.to_string())),
            }
        };

        let sample = self
            .sampler
            .sample_at(&inspect.id, &counter, started_at, memory, now);
        if let Some(warning) = sample.warning {
            tracing::debug!(container = %short_id(&inspect.id), warning = %warning, "Container stats unavailable");
        }
        sample.reading
    }
}

/// Ids and names only; anything that looks like a path or flag is rejected.
fn validate_container_id(id: &str) -> SirberusResult<()> {
    let valid = !id.is_empty()
        && !id.starts_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(SirberusError::InvalidArgument(format!(
            "invalid container id: {}",
            id
        )))
    }
}
