//! Timed execution of a single unit of inference work.

use std::{
    fs,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::HarnessError;

/// One measurement: how long a call took, how many items it processed and
/// the resident memory right after it returned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub elapsed: Duration,
    pub item_count: usize,
    pub memory_mb: f64,
}

impl Sample {
    pub fn new(elapsed: Duration, item_count: usize, memory_mb: f64) -> Self {
        Self {
            elapsed,
            item_count,
            memory_mb,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Source of process memory readings, in megabytes.
pub trait MemoryProbe: Send + Sync {
    fn resident_mb(&self) -> f64;
}

/// Reads `VmRSS` from `/proc/self/status`. Reports 0 where procfs is absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    fn resident_mb(&self) -> f64 {
        let Ok(status) = fs::read_to_string("/proc/self/status") else {
            return 0.0;
        };
        parse_vm_rss_mb(&status).unwrap_or(0.0)
    }
}

fn parse_vm_rss_mb(status: &str) -> Option<f64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| kb / 1024.0)
}

/// Fixed reading, for tests and for platforms where memory is not tracked.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedMemory(pub f64);

impl MemoryProbe for FixedMemory {
    fn resident_mb(&self) -> f64 {
        self.0
    }
}

#[derive(Clone)]
pub struct Sampler {
    probe: Arc<dyn MemoryProbe>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(Arc::new(ProcessMemory))
    }
}

impl Sampler {
    pub fn new(probe: Arc<dyn MemoryProbe>) -> Self {
        Self { probe }
    }

    pub fn memory_mb(&self) -> f64 {
        self.probe.resident_mb()
    }

    /// Runs `work` exactly once and measures it with a monotonic clock.
    ///
    /// `item_count` is validated before `work` runs. Errors from `work` are
    /// returned as-is; nothing is retried.
    pub fn sample<T, E, F>(&self, item_count: usize, work: F) -> Result<Sample, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<HarnessError>,
    {
        if item_count == 0 {
            return Err(HarnessError::invalid_scenario("item count must be positive").into());
        }
        let start = Instant::now();
        work()?;
        let elapsed = start.elapsed();
        let memory_mb = self.probe.resident_mb();
        Ok(Sample::new(elapsed, item_count, memory_mb))
    }

    /// Like [`Sampler::sample`], but `work` reports how long the inference
    /// took. Used when the call runs on another thread and handing it over
    /// must not count towards its latency.
    pub fn sample_reported<E, F>(&self, item_count: usize, work: F) -> Result<Sample, E>
    where
        F: FnOnce() -> Result<Duration, E>,
        E: From<HarnessError>,
    {
        if item_count == 0 {
            return Err(HarnessError::invalid_scenario("item count must be positive").into());
        }
        let elapsed = work()?;
        let memory_mb = self.probe.resident_mb();
        Ok(Sample::new(elapsed, item_count, memory_mb))
    }
}
