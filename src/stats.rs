//! Reduction of raw samples into a [`MetricsRecord`].
//!
//! Percentiles use nearest-rank selection over the ascending durations, so
//! the result never depends on sample order. Throughput is pooled across the
//! whole run (total items over total time) rather than averaged per sample,
//! which keeps small batches from dominating the figure.

use std::time::Duration;

use crate::{
    HarnessError,
    record::{MetricsRecord, ScenarioKey},
    sample::Sample,
};

/// Context the aggregator needs beyond the samples themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioMetadata {
    pub key: ScenarioKey,
    /// Resident memory read before the first sample ran.
    pub baseline_memory_mb: f64,
    pub failure_count: usize,
    pub captured_at: u64,
}

impl ScenarioMetadata {
    pub fn new(key: ScenarioKey, baseline_memory_mb: f64, captured_at: u64) -> Self {
        Self {
            key,
            baseline_memory_mb,
            failure_count: 0,
            captured_at,
        }
    }

    pub fn with_failures(mut self, failure_count: usize) -> Self {
        self.failure_count = failure_count;
        self
    }
}

pub fn aggregate(
    samples: &[Sample],
    meta: &ScenarioMetadata,
) -> Result<MetricsRecord, HarnessError> {
    if samples.is_empty() {
        return Err(HarnessError::insufficient_samples(format!(
            "{}: no successful samples to aggregate",
            meta.key
        )));
    }

    let mut latencies: Vec<f64> = samples.iter().map(Sample::elapsed_ms).collect();
    latencies.sort_by(f64::total_cmp);

    let total_elapsed: Duration = samples.iter().map(|s| s.elapsed).sum();
    let total_items: usize = samples.iter().map(|s| s.item_count).sum();
    let peak_memory_mb = samples
        .iter()
        .map(|s| s.memory_mb)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(MetricsRecord {
        component: meta.key.component.clone(),
        batch_size: meta.key.batch_size,
        length_bucket: meta.key.length_bucket,
        avg_latency_ms: total_elapsed.as_secs_f64() * 1000.0 / samples.len() as f64,
        p50_latency_ms: nearest_rank(&latencies, 50.0),
        p95_latency_ms: nearest_rank(&latencies, 95.0),
        p99_latency_ms: nearest_rank(&latencies, 99.0),
        throughput_items_per_sec: throughput(total_items, total_elapsed),
        peak_memory_mb,
        memory_delta_mb: peak_memory_mb - meta.baseline_memory_mb,
        sample_count: samples.len(),
        failure_count: meta.failure_count,
        captured_at: meta.captured_at,
    })
}

/// Nearest-rank percentile of an ascending slice:
/// `index = ceil(pct / 100 * n) - 1`, clamped to the slice bounds.
pub fn nearest_rank(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct * sorted.len() as f64 / 100.0).ceil() as isize - 1;
    let idx = rank.clamp(0, sorted.len() as isize - 1) as usize;
    sorted[idx]
}

/// Items per second over the pooled elapsed time; zero when nothing was timed.
pub fn throughput(total_items: usize, total_elapsed: Duration) -> f64 {
    let secs = total_elapsed.as_secs_f64();
    if secs > 0.0 {
        total_items as f64 / secs
    } else {
        0.0
    }
}
