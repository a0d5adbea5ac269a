use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use inferbench::{
    Baseline, LengthBucket, ScenarioKey, Tolerances,
    compare::compare_baselines,
    sample::Sample,
    stats::{ScenarioMetadata, aggregate},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const SAMPLE_SEED: u64 = 0xD41E;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

fn sample_counts() -> &'static [usize] {
    #[cfg(feature = "bench-ci")]
    {
        &[20, 200]
    }
    #[cfg(not(feature = "bench-ci"))]
    {
        &[20, 200, 2_000, 20_000]
    }
}

fn generate_samples(count: usize, seed: u64) -> Vec<Sample> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Sample::new(
                Duration::from_micros(rng.gen_range(500..20_000)),
                64,
                rng.gen_range(400.0..600.0),
            )
        })
        .collect()
}

fn sweep_baseline(name: &str, seed: u64) -> Baseline {
    let mut baseline = Baseline::new(name);
    for (i, &batch) in [1usize, 8, 32, 64].iter().enumerate() {
        for bucket in LengthBucket::ALL {
            let key = ScenarioKey::new("embedding", batch, bucket);
            let meta = ScenarioMetadata::new(key, 400.0, 0);
            let samples = generate_samples(SAMPLE_SIZE, seed + i as u64);
            if let Ok(record) = aggregate(&samples, &meta) {
                baseline.insert(record);
            }
        }
    }
    baseline
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    let meta = ScenarioMetadata::new(
        ScenarioKey::new("embedding", 64, LengthBucket::Medium),
        400.0,
        0,
    );
    for &count in sample_counts() {
        let samples = generate_samples(count, SAMPLE_SEED + count as u64);
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| aggregate(&samples, &meta).expect("aggregate"));
        });
    }
    group.finish();
}

fn bench_compare_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare_sweep");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    let stored = sweep_baseline("stored", SAMPLE_SEED);
    let current = sweep_baseline("current", SAMPLE_SEED ^ 0xFF);
    let tolerances = Tolerances::default();
    group.bench_function("embedding_12_scenarios", |b| {
        b.iter(|| compare_baselines(&stored, &current, &tolerances).expect("compare"));
    });
    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_compare_sweep);
criterion_main!(benches);
