//! Per-entity CPU baseline store and delta computation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sirberus_shared::constants::metrics::{BASELINE_TTL, MIN_SAMPLE_INTERVAL};
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::reading::{CpuCounter, CpuPercent, ResourceReading};

/// Anything that can produce the current cumulative CPU counter of an entity.
pub trait CpuCounterSource {
    fn read_counter(&self) -> SirberusResult<CpuCounter>;
}

impl<F> CpuCounterSource for F
where
    F: Fn() -> SirberusResult<CpuCounter>,
{
    fn read_counter(&self) -> SirberusResult<CpuCounter> {
        self()
    }
}

/// Outcome of one sampling call.
///
/// `warning` is set when the counter could not be read; the reading is then
/// all zeros and the snapshot that asked for it should still be returned.
#[derive(Debug)]
pub struct Sample {
    pub reading: ResourceReading,
    pub warning: Option<SirberusError>,
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    cpu_nanos: u64,
    captured_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Slot {
    baseline: Option<Baseline>,
    last_sampled: Option<DateTime<Utc>>,
}

/// Thread-safe store of CPU baselines, one per entity key.
///
/// The outer lock only guards the key map. Each key has its own lock, held
/// for the whole read-compute-store sequence, so samples for the same key are
/// serialized while different keys proceed in parallel.
#[derive(Clone)]
pub struct MetricSampler {
    slots: Arc<Mutex<HashMap<String, Arc<Mutex<Slot>>>>>,
    min_interval: Duration,
    ttl: Duration,
}

impl std::fmt::Debug for MetricSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSampler")
            .field("tracked", &self.len())
            .finish()
    }
}

impl Default for MetricSampler {
    fn default() -> Self {
        Self::new(MIN_SAMPLE_INTERVAL, BASELINE_TTL)
    }
}

impl MetricSampler {
    pub fn new(min_interval: Duration, ttl: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            min_interval,
            ttl,
        }
    }

    /// Sample `key` now.
    pub fn sample(
        &self,
        key: &str,
        counter: &impl CpuCounterSource,
        started_at: Option<DateTime<Utc>>,
        memory_bytes: u64,
    ) -> Sample {
        self.sample_at(key, counter, started_at, memory_bytes, Utc::now())
    }

    /// Sample `key` as if the current time were `now`.
    pub fn sample_at(
        &self,
        key: &str,
        counter: &impl CpuCounterSource,
        started_at: Option<DateTime<Utc>>,
        memory_bytes: u64,
        now: DateTime<Utc>,
    ) -> Sample {
        let slot = self.slot(key);
        let mut slot = slot.lock();
        slot.last_sampled = Some(now);

        let current = match counter.read_counter() {
            Ok(c) => c.as_nanos(),
            Err(e) => {
                tracing::debug!(entity = %key, error = %e, "CPU counter unavailable");
                return Sample {
                    reading: ResourceReading::unavailable(),
                    warning: Some(e),
                };
            }
        };

        let cpu_percent = match slot.baseline {
            None => {
                slot.baseline = Some(Baseline {
                    cpu_nanos: current,
                    captured_at: now,
                });
                CpuPercent::NoData
            }
            Some(prior) if started_at.is_some_and(|s| s > prior.captured_at) => {
                tracing::debug!(entity = %key, "Restart detected, resetting CPU baseline");
                slot.baseline = Some(Baseline {
                    cpu_nanos: current,
                    captured_at: now,
                });
                CpuPercent::NoData
            }
            Some(prior) if current < prior.cpu_nanos => {
                tracing::debug!(
                    entity = %key,
                    previous = prior.cpu_nanos,
                    current,
                    "CPU counter went backwards, resetting baseline"
                );
                slot.baseline = Some(Baseline {
                    cpu_nanos: current,
                    captured_at: now,
                });
                CpuPercent::NoData
            }
            Some(prior) => {
                let elapsed = (now - prior.captured_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if elapsed < self.min_interval {
                    CpuPercent::Value(0.0)
                } else {
                    let delta = (current - prior.cpu_nanos) as f64;
                    let percent = delta / elapsed.as_nanos() as f64 * 100.0;
                    slot.baseline = Some(Baseline {
                        cpu_nanos: current,
                        captured_at: now,
                    });
                    CpuPercent::Value(percent)
                }
            }
        };

        Sample {
            reading: ResourceReading {
                cpu_percent,
                memory_bytes,
            },
            warning: None,
        }
    }

    /// Drop baselines for entities not sampled within the TTL.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| match slot.lock().last_sampled {
            Some(at) => now - at <= ttl,
            None => true,
        });
        before - slots.len()
    }

    /// Number of entities currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn a task that evicts idle baselines every `interval` until cancelled.
    pub fn spawn_janitor(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let sampler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = sampler.evict_idle(Utc::now());
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = sampler.len(), "Evicted idle CPU baselines");
                        }
                    }
                }
            }
        })
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock();
        slots.entry(key.to_string()).or_default().clone()
    }
}

// Compile-time check: the sampler is shared across request handlers.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MetricSampler>();
};
