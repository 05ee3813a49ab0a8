//! Resource utilization sampling.
//!
//! Converts cumulative CPU counters into instantaneous percentages and
//! pairs them with instantaneous memory readings.
//!
//! ## Architecture
//!
//! - **CgroupCpuReader**: reads cumulative CPU time from cgroup v2 or v1 accounting files
//! - **MetricSampler**: keeps one baseline per entity and computes deltas against it
//! - **ResourceReading**: the result handed to service and container snapshots

mod cgroup;
mod reading;
mod sampler;

pub use cgroup::{CgroupCpu, CgroupCpuReader};
pub use reading::{CpuCounter, CpuPercent, CpuTimeUnit, ResourceReading};
pub use sampler::{CpuCounterSource, MetricSampler, Sample};
