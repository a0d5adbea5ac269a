//! Direction-aware regression checks between a baseline record and a fresh
//! one. Only movement against a metric's preferred direction counts; a
//! delta exactly at the tolerance passes.

use serde::{Deserialize, Serialize};

use crate::{
    HarnessError,
    record::{Baseline, MetricsRecord, ScenarioKey},
};

pub const DEFAULT_TOLERANCE_PCT: f64 = 10.0;

/// Slack, in percentage points, so float noise on a boundary value does not
/// flip a pass into a fail.
const BOUNDARY_EPSILON_PCT: f64 = 1e-9;

/// Allowed adverse movement per metric class, in percent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub latency_pct: f64,
    pub throughput_pct: f64,
    pub memory_pct: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::uniform(DEFAULT_TOLERANCE_PCT)
    }
}

impl Tolerances {
    pub fn uniform(pct: f64) -> Self {
        Self {
            latency_pct: pct,
            throughput_pct: pct,
            memory_pct: pct,
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        for (name, value) in [
            ("latency", self.latency_pct),
            ("throughput", self.throughput_pct),
            ("memory", self.memory_pct),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(HarnessError::invalid_scenario(format!(
                    "{name} tolerance must be a non-negative percentage, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn for_class(&self, class: MetricClass) -> f64 {
        match class {
            MetricClass::Latency => self.latency_pct,
            MetricClass::Throughput => self.throughput_pct,
            MetricClass::Memory => self.memory_pct,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricClass {
    Latency,
    Throughput,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    AvgLatency,
    P95Latency,
    Throughput,
    PeakMemory,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 4] = [
        TrackedMetric::AvgLatency,
        TrackedMetric::P95Latency,
        TrackedMetric::Throughput,
        TrackedMetric::PeakMemory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TrackedMetric::AvgLatency => "avg_latency_ms",
            TrackedMetric::P95Latency => "p95_latency_ms",
            TrackedMetric::Throughput => "throughput_items_per_sec",
            TrackedMetric::PeakMemory => "peak_memory_mb",
        }
    }

    pub fn class(self) -> MetricClass {
        match self {
            TrackedMetric::AvgLatency | TrackedMetric::P95Latency => MetricClass::Latency,
            TrackedMetric::Throughput => MetricClass::Throughput,
            TrackedMetric::PeakMemory => MetricClass::Memory,
        }
    }

    pub fn direction(self) -> Direction {
        match self.class() {
            MetricClass::Throughput => Direction::HigherIsBetter,
            MetricClass::Latency | MetricClass::Memory => Direction::LowerIsBetter,
        }
    }

    pub fn value(self, record: &MetricsRecord) -> f64 {
        match self {
            TrackedMetric::AvgLatency => record.avg_latency_ms,
            TrackedMetric::P95Latency => record.p95_latency_ms,
            TrackedMetric::Throughput => record.throughput_items_per_sec,
            TrackedMetric::PeakMemory => record.peak_memory_mb,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictStatus {
    Pass,
    Fail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionVerdict {
    pub metric: TrackedMetric,
    pub baseline_value: f64,
    pub current_value: f64,
    /// Signed change relative to the baseline, in percent.
    pub delta_pct: f64,
    pub threshold_pct: f64,
    pub status: VerdictStatus,
}

impl RegressionVerdict {
    pub fn passed(&self) -> bool {
        self.status == VerdictStatus::Pass
    }

    /// Change in the unfavourable direction; negative means improvement.
    pub fn adverse_delta_pct(&self) -> f64 {
        adverse(self.metric.direction(), self.delta_pct)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} baseline={:.3} current={:.3} delta={:+.2}% threshold={:.2}%",
            self.metric.name(),
            self.baseline_value,
            self.current_value,
            self.delta_pct,
            self.threshold_pct
        )
    }
}

/// Compares one scenario's fresh record with its baseline. Both records
/// must describe the same scenario.
pub fn compare(
    baseline: &MetricsRecord,
    current: &MetricsRecord,
    tolerances: &Tolerances,
) -> Result<Vec<RegressionVerdict>, HarnessError> {
    tolerances.validate()?;
    let (base_key, current_key) = (baseline.key(), current.key());
    if base_key != current_key {
        return Err(HarnessError::invalid_scenario(format!(
            "cannot compare {current_key} against baseline for {base_key}"
        )));
    }
    Ok(TrackedMetric::ALL
        .iter()
        .map(|&metric| verdict(metric, baseline, current, tolerances))
        .collect())
}

fn verdict(
    metric: TrackedMetric,
    baseline: &MetricsRecord,
    current: &MetricsRecord,
    tolerances: &Tolerances,
) -> RegressionVerdict {
    let baseline_value = metric.value(baseline);
    let current_value = metric.value(current);
    let delta_pct = percent_delta(baseline_value, current_value);
    let threshold_pct = tolerances.for_class(metric.class());
    let status = if adverse(metric.direction(), delta_pct) > threshold_pct + BOUNDARY_EPSILON_PCT {
        VerdictStatus::Fail
    } else {
        VerdictStatus::Pass
    };
    RegressionVerdict {
        metric,
        baseline_value,
        current_value,
        delta_pct,
        threshold_pct,
        status,
    }
}

/// `(current - baseline) * 100 / baseline`. A zero baseline yields zero when
/// nothing changed and an infinite delta otherwise.
pub fn percent_delta(baseline: f64, current: f64) -> f64 {
    let diff = current - baseline;
    if baseline == 0.0 {
        if diff == 0.0 {
            0.0
        } else {
            f64::INFINITY.copysign(diff)
        }
    } else {
        diff * 100.0 / baseline.abs()
    }
}

fn adverse(direction: Direction, delta_pct: f64) -> f64 {
    match direction {
        Direction::LowerIsBetter => delta_pct,
        Direction::HigherIsBetter => -delta_pct,
    }
}

pub fn all_passed(verdicts: &[RegressionVerdict]) -> bool {
    verdicts.iter().all(RegressionVerdict::passed)
}

/// Outcome of comparing every scenario of a run with a stored baseline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub compared: Vec<(ScenarioKey, Vec<RegressionVerdict>)>,
    /// Scenarios present in the run but absent from the baseline.
    pub missing: Vec<ScenarioKey>,
    /// Scenarios in the baseline that the run did not produce, usually
    /// because they failed or were never executed.
    #[serde(default)]
    pub dropped: Vec<ScenarioKey>,
}

impl BaselineComparison {
    /// A dropped scenario fails the comparison like a regression does.
    pub fn passed(&self) -> bool {
        self.dropped.is_empty()
            && self
                .compared
                .iter()
                .all(|(_, verdicts)| all_passed(verdicts))
    }

    pub fn failures(&self) -> Vec<String> {
        let regressions = self.compared.iter().flat_map(|(key, verdicts)| {
            verdicts
                .iter()
                .filter(|v| !v.passed())
                .map(move |v| format!("{key} regression: {}", v.describe()))
        });
        let dropped = self
            .dropped
            .iter()
            .map(|key| format!("{key} missing from current results"));
        regressions.chain(dropped).collect()
    }
}

pub fn compare_baselines(
    baseline: &Baseline,
    current: &Baseline,
    tolerances: &Tolerances,
) -> Result<BaselineComparison, HarnessError> {
    tolerances.validate()?;
    let mut comparison = BaselineComparison::default();
    for record in current.records.values() {
        let key = record.key();
        match baseline.get(&key) {
            Some(base) => {
                let verdicts = compare(base, record, tolerances)?;
                comparison.compared.push((key, verdicts));
            }
            None => comparison.missing.push(key),
        }
    }
    comparison.dropped = baseline
        .records
        .values()
        .map(MetricsRecord::key)
        .filter(|key| current.get(key).is_none())
        .collect();
    Ok(comparison)
}
