//! Service list and detail snapshots.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use serde::Serialize;
use sirberus_shared::constants::systemd::{JOB_RESULT_DONE, LIST_CONCURRENCY};
use sirberus_shared::errors::{SirberusError, SirberusResult};

use super::properties::{UnitProperties, format_uuid};
use super::{ServiceManager, UnitOperation, UnitSummary, service_name, validate_unit_name};
use crate::metrics::{CgroupCpu, CgroupCpuReader, CpuPercent, MetricSampler, ResourceReading};
use crate::util::process::{is_process_alive, read_proc_cmdline};

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub cpu_percent: CpuPercent,
    pub memory_bytes: u64,
    pub uptime_seconds: u64,
    pub is_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDetails {
    #[serde(flatten)]
    pub summary: ServiceSummary,
    pub drop_in_paths: Vec<String>,
    pub invocation_id: String,
    pub triggered_by: Vec<String>,
    pub documentation: Vec<String>,
    pub main_pid: u32,
    pub main_process: String,
    pub since: String,
    pub ip_ingress_bytes: u64,
    pub ip_egress_bytes: u64,
    pub io_read_bytes: u64,
    pub io_write_bytes: u64,
    pub tasks_current: u64,
    pub tasks_max: u64,
    pub memory_peak: u64,
    pub cpu_usage_nsec: u64,
    pub control_group: String,
    pub fragment_path: String,
}

/// Builds service snapshots from the service manager and cgroup accounting.
#[derive(Clone)]
pub struct ServiceCatalog {
    manager: Arc<dyn ServiceManager>,
    sampler: MetricSampler,
    cgroups: CgroupCpuReader,
}

impl std::fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCatalog")
            .field("cgroup_root", &self.cgroups.root())
            .finish()
    }
}

impl ServiceCatalog {
    pub fn new(
        manager: Arc<dyn ServiceManager>,
        sampler: MetricSampler,
        cgroups: CgroupCpuReader,
    ) -> Self {
        Self {
            manager,
            sampler,
            cgroups,
        }
    }

    /// Normalize and check that the unit exists.
    pub async fn resolve(&self, name: &str) -> SirberusResult<String> {
        let name = service_name(name);
        validate_unit_name(&name)?;
        self.manager.unit_properties(&name).await?;
        Ok(name)
    }

    pub async fn list(&self) -> SirberusResult<Vec<ServiceSummary>> {
        let units = self.manager.list_units().await?;
        let services = futures::stream::iter(units)
            .map(|unit| self.summarize(unit))
            .buffered(LIST_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        Ok(services)
    }

    pub async fn details(&self, name: &str) -> SirberusResult<ServiceDetails> {
        let name = service_name(name);
        validate_unit_name(&name)?;
        let props = self.manager.unit_properties(&name).await?;
        Ok(self.build_details(&name, &props, Utc::now()))
    }

    /// Run `op` on the unit and return the success message.
    pub async fn run(&self, name: &str, op: UnitOperation) -> SirberusResult<String> {
        let name = self.resolve(name).await?;
        let job = self.manager.run_job(&name, op).await?;
        if job.result != JOB_RESULT_DONE {
            let detail = job.detail.map(|d| format!(": {}", d)).unwrap_or_default();
            return Err(SirberusError::OperationFailed(format!(
                "failed to {} service: job result {}{}",
                op, job.result, detail
            )));
        }
        tracing::info!(unit = %name, operation = %op, "Unit job completed");
        Ok(format!("Service {} {} successfully", name, op.past_tense()))
    }

    async fn summarize(&self, unit: UnitSummary) -> ServiceSummary {
        let is_running = unit.active_state == "active";
        if !is_running {
            return summary_from(unit, ResourceReading::unavailable(), 0, false);
        }

        match self.manager.unit_properties(&unit.name).await {
            Ok(props) => {
                let now = Utc::now();
                let reading = self.sample(&unit.name, &props, now);
                let uptime = uptime_seconds(&props, now);
                summary_from(unit, reading, uptime, true)
            }
            Err(e) => {
                tracing::warn!(unit = %unit.name, error = %e, "Failed to read unit properties");
                summary_from(unit, ResourceReading::unavailable(), 0, true)
            }
        }
    }

    fn sample(&self, name: &str, props: &UnitProperties, now: DateTime<Utc>) -> ResourceReading {
        let cgroup = props.get_string("ControlGroup");
        let started_at = props.get_timestamp("ActiveEnterTimestamp");
        let memory = match props.get_u64("MemoryCurrent") {
            u64::MAX => 0,
            v => v,
        };
        let counter = CgroupCpu {
            reader: &self.cgroups,
            cgroup: &cgroup,
        };
        let sample = self
            .sampler
            .sample_at(name, &counter, started_at, memory, now);
        if let Some(warning) = sample.warning {
            tracing::debug!(unit = %name, cgroup = %cgroup, warning = %warning, "CPU usage unavailable");
        }
        sample.reading
    }

    fn build_details(
        &self,
        name: &str,
        props: &UnitProperties,
        now: DateTime<Utc>,
    ) -> ServiceDetails {
        let is_running = props.get_string("ActiveState") == "active";
        let (reading, uptime) = if is_running {
            (self.sample(name, props, now), uptime_seconds(props, now))
        } else {
            (ResourceReading::unavailable(), 0)
        };

        let unit = UnitSummary {
            name: name.to_string(),
            description: props.get_string("Description"),
            load_state: props.get_string("LoadState"),
            active_state: props.get_string("ActiveState"),
            sub_state: props.get_string("SubState"),
        };

        let main_pid = props.get_u32("MainPID");
        let main_process = if main_pid > 0 && is_process_alive(main_pid) {
            read_proc_cmdline(main_pid)
        } else {
            None
        }
        .or_else(|| props.exec_start_path())
        .unwrap_or_default();

        let since = props
            .get_timestamp("ActiveEnterTimestamp")
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();

        ServiceDetails {
            summary: summary_from(unit, reading, uptime, is_running),
            drop_in_paths: props.get_string_array("DropInPaths"),
            invocation_id: format_uuid(props.get_bytes("InvocationID")),
            triggered_by: props.get_string_array("TriggeredBy"),
            documentation: props.get_string_array("Documentation"),
            main_pid,
            main_process,
            since,
            ip_ingress_bytes: props.get_u64("IPIngressBytes"),
            ip_egress_bytes: props.get_u64("IPEgressBytes"),
            io_read_bytes: props.get_u64("IOReadBytes"),
            io_write_bytes: props.get_u64("IOWriteBytes"),
            tasks_current: props.get_u64("TasksCurrent"),
            tasks_max: props.get_u64("TasksMax"),
            memory_peak: props.get_u64("MemoryHigh"),
            cpu_usage_nsec: props.get_u64("CPUUsageNSec"),
            control_group: props.get_string("ControlGroup"),
            fragment_path: props.get_string("FragmentPath"),
        }
    }
}

fn summary_from(
    unit: UnitSummary,
    reading: ResourceReading,
    uptime_seconds: u64,
    is_running: bool,
) -> ServiceSummary {
    ServiceSummary {
        name: unit.name,
        description: unit.description,
        load_state: unit.load_state,
        active_state: unit.active_state,
        sub_state: unit.sub_state,
        cpu_percent: reading.cpu_percent,
        memory_bytes: reading.memory_bytes,
        uptime_seconds,
        is_running,
    }
}

fn uptime_seconds(props: &UnitProperties, now: DateTime<Utc>) -> u64 {
    props
        .get_timestamp("ActiveEnterTimestamp")
        .map(|started| (now - started).num_seconds().max(0) as u64)
        .unwrap_or(0)
}
