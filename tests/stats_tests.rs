use std::time::Duration;

use inferbench::record::{LengthBucket, ScenarioKey};
use inferbench::sample::Sample;
use inferbench::stats::{ScenarioMetadata, aggregate, nearest_rank};
use inferbench::HarnessError;
use proptest::prelude::*;

fn meta() -> ScenarioMetadata {
    ScenarioMetadata::new(
        ScenarioKey::new("embedding", 10, LengthBucket::Short),
        100.0,
        1_700_000_000,
    )
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_two_samples_pool_throughput() {
    let samples = vec![
        Sample::new(ms(50), 10, 120.0),
        Sample::new(ms(150), 10, 130.0),
    ];
    let record = aggregate(&samples, &meta()).unwrap();
    assert!((record.avg_latency_ms - 100.0).abs() < 1e-9);
    assert!((record.throughput_items_per_sec - 100.0).abs() < 1e-9);
    assert_eq!(record.sample_count, 2);
    assert_eq!(record.peak_memory_mb, 130.0);
    assert!((record.memory_delta_mb - 30.0).abs() < 1e-9);
}

#[test]
fn test_single_sample_fills_every_percentile() {
    let record = aggregate(&[Sample::new(ms(8), 10, 50.0)], &meta()).unwrap();
    assert_eq!(record.p50_latency_ms, 8.0);
    assert_eq!(record.p95_latency_ms, 8.0);
    assert_eq!(record.p99_latency_ms, 8.0);
}

#[test]
fn test_empty_samples_rejected() {
    assert!(matches!(
        aggregate(&[], &meta()),
        Err(HarnessError::InsufficientSamples(_))
    ));
}

#[test]
fn test_failures_carried_into_record() {
    let record = aggregate(
        &[Sample::new(ms(5), 10, 1.0)],
        &meta().with_failures(3),
    )
    .unwrap();
    assert_eq!(record.failure_count, 3);
    assert_eq!(record.captured_at, 1_700_000_000);
    assert_eq!(record.key(), meta().key);
}

#[test]
fn test_nearest_rank_on_hundred_values() {
    let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
    assert_eq!(nearest_rank(&sorted, 50.0), 50.0);
    assert_eq!(nearest_rank(&sorted, 95.0), 95.0);
    assert_eq!(nearest_rank(&sorted, 99.0), 99.0);
    assert_eq!(nearest_rank(&sorted, 0.0), 1.0);
    assert_eq!(nearest_rank(&sorted, 100.0), 100.0);
}

proptest! {
    #[test]
    fn prop_percentiles_are_ordered(durations in prop::collection::vec(1u64..5_000, 1..64)) {
        let samples: Vec<Sample> = durations
            .iter()
            .map(|&us| Sample::new(Duration::from_micros(us), 4, 10.0))
            .collect();
        let record = aggregate(&samples, &meta()).unwrap();
        prop_assert!(record.p50_latency_ms <= record.p95_latency_ms);
        prop_assert!(record.p95_latency_ms <= record.p99_latency_ms);
        let max = durations.iter().copied().max().unwrap() as f64 / 1000.0;
        prop_assert!(record.p99_latency_ms <= max + 1e-12);
        prop_assert!(record.throughput_items_per_sec > 0.0);
    }

    #[test]
    fn prop_order_does_not_matter(mut durations in prop::collection::vec(1u64..5_000, 1..32)) {
        let build = |d: &[u64]| -> Vec<Sample> {
            d.iter().map(|&us| Sample::new(Duration::from_micros(us), 2, 1.0)).collect()
        };
        let forward = aggregate(&build(&durations), &meta()).unwrap();
        durations.reverse();
        let reversed = aggregate(&build(&durations), &meta()).unwrap();
        prop_assert_eq!(forward.p50_latency_ms, reversed.p50_latency_ms);
        prop_assert_eq!(forward.p95_latency_ms, reversed.p95_latency_ms);
        prop_assert_eq!(forward.p99_latency_ms, reversed.p99_latency_ms);
    }
}
