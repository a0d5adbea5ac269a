//! Latency, throughput and memory regression harness for inference
//! components.
//!
//! A [`BenchmarkRunner`] sweeps an [`InferenceTarget`] over batch sizes and
//! input length buckets, aggregates the timed samples into one
//! [`MetricsRecord`] per scenario and either stores them as a named
//! [`Baseline`] or checks them against one with per-metric [`Tolerances`].
//! Run Criterion benchmarks with `cargo bench` to inspect the harness's own
//! overhead under `target/criterion`.

pub mod cli;
pub mod compare;
pub mod config;
pub mod errors;
pub mod record;
pub mod report;
pub mod runner;
pub mod sample;
pub mod stats;
pub mod store;
pub mod synthetic;
pub mod target;

pub use crate::compare::{
    BaselineComparison, RegressionVerdict, Tolerances, TrackedMetric, VerdictStatus, compare,
    compare_baselines,
};
pub use crate::config::{
    ComponentSweep, MissingBaselinePolicy, RunMode, RunnerConfig, StoreConfig, StoreKind,
    open_store,
};
pub use crate::errors::HarnessError;
pub use crate::record::{Baseline, LengthBucket, MetricsRecord, ScenarioKey};
pub use crate::runner::{BenchmarkRunner, CancelToken, ScenarioRun, ScenarioState, SweepReport};
pub use crate::sample::{FixedMemory, MemoryProbe, ProcessMemory, Sample, Sampler};
pub use crate::stats::{ScenarioMetadata, aggregate};
pub use crate::store::{BaselineStore, JsonBaselineStore, MemoryBaselineStore};
#[cfg(feature = "sqlite-store")]
pub use crate::store::SqliteBaselineStore;
pub use crate::target::{FnTarget, InferenceInput, InferenceTarget, InputKind};
