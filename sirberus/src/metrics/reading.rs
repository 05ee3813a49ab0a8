//! Sampling result types.

use serde::{Serialize, Serializer};
use sirberus_shared::constants::metrics::NO_DATA_SENTINEL;

/// CPU utilization, or the absence of a computable value.
///
/// `NoData` is reported for the first sample of an entity and right after a
/// restart. It is serialized as `-1` so clients can tell it apart from idle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuPercent {
    NoData,
    Value(f64),
}

impl CpuPercent {
    pub fn as_f64(self) -> f64 {
        match self {
            CpuPercent::NoData => NO_DATA_SENTINEL,
            CpuPercent::Value(v) => v,
        }
    }

    pub fn is_no_data(self) -> bool {
        matches!(self, CpuPercent::NoData)
    }
}

impl Serialize for CpuPercent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceReading {
    pub cpu_percent: CpuPercent,
    pub memory_bytes: u64,
}

impl ResourceReading {
    /// Reading used when the counter source is missing.
    pub fn unavailable() -> Self {
        Self {
            cpu_percent: CpuPercent::Value(0.0),
            memory_bytes: 0,
        }
    }
}

/// Granularity of a cumulative CPU-time counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuTimeUnit {
    Nanoseconds,
    Microseconds,
}

/// A raw cumulative CPU-time counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCounter {
    pub value: u64,
    pub unit: CpuTimeUnit,
}

impl CpuCounter {
    pub fn nanos(value: u64) -> Self {
        Self {
            value,
            unit: CpuTimeUnit::Nanoseconds,
        }
    }

    pub fn micros(value: u64) -> Self {
        Self {
            value,
            unit: CpuTimeUnit::Microseconds,
        }
    }

    /// Counter value normalized to nanoseconds.
    pub fn as_nanos(&self) -> u64 {
        match self.unit {
            CpuTimeUnit::Nanoseconds => self.value,
            CpuTimeUnit::Microseconds => self.value.saturating_mul(1_000),
        }
    }
}
