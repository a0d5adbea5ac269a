use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::HarnessError;

/// Highest baseline document version this harness writes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

impl LengthBucket {
    pub const ALL: [LengthBucket; 3] = [
        LengthBucket::Short,
        LengthBucket::Medium,
        LengthBucket::Long,
    ];

    /// Number of words per generated input text.
    pub fn words(self) -> usize {
        match self {
            LengthBucket::Short => 12,
            LengthBucket::Medium => 64,
            LengthBucket::Long => 256,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LengthBucket::Short => "short",
            LengthBucket::Medium => "medium",
            LengthBucket::Long => "long",
        }
    }
}

impl fmt::Display for LengthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LengthBucket {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(LengthBucket::Short),
            "medium" => Ok(LengthBucket::Medium),
            "long" => Ok(LengthBucket::Long),
            other => Err(HarnessError::invalid_scenario(format!(
                "unknown length bucket {other}"
            ))),
        }
    }
}

/// Identifies one benchmarked configuration. Renders as
/// `component/batch=N/len=bucket`, which is also its key in baseline documents.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioKey {
    pub component: String,
    pub batch_size: usize,
    pub length_bucket: LengthBucket,
}

impl ScenarioKey {
    pub fn new<T: Into<String>>(
        component: T,
        batch_size: usize,
        length_bucket: LengthBucket,
    ) -> Self {
        Self {
            component: component.into(),
            batch_size,
            length_bucket,
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.component.trim().is_empty() {
            return Err(HarnessError::invalid_scenario(
                "component name must not be empty",
            ));
        }
        if self.component.contains('/') {
            return Err(HarnessError::invalid_scenario(format!(
                "component name {} must not contain '/'",
                self.component
            )));
        }
        if self.batch_size == 0 {
            return Err(HarnessError::invalid_scenario(format!(
                "{self}: batch size must be positive"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/batch={}/len={}",
            self.component, self.batch_size, self.length_bucket
        )
    }
}

impl FromStr for ScenarioKey {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(component), Some(batch), Some(len), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(HarnessError::invalid_scenario(format!(
                "malformed scenario key {s}"
            )));
        };
        let batch_size = batch
            .strip_prefix("batch=")
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| HarnessError::invalid_scenario(format!("malformed batch in {s}")))?;
        let length_bucket = len
            .strip_prefix("len=")
            .ok_or_else(|| HarnessError::invalid_scenario(format!("malformed length in {s}")))?
            .parse()?;
        Ok(Self::new(component, batch_size, length_bucket))
    }
}

/// Aggregated measurements for one scenario. Latencies are milliseconds,
/// memory is megabytes, throughput is items per second.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub component: String,
    pub batch_size: usize,
    pub length_bucket: LengthBucket,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub throughput_items_per_sec: f64,
    pub peak_memory_mb: f64,
    #[serde(default)]
    pub memory_delta_mb: f64,
    pub sample_count: usize,
    #[serde(default)]
    pub failure_count: usize,
    pub captured_at: u64,
}

impl MetricsRecord {
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(self.component.clone(), self.batch_size, self.length_bucket)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: avg={:.2}ms p50={:.2}ms p95={:.2}ms p99={:.2}ms throughput={:.1}/s peak={:.1}MB samples={} failures={}",
            self.key(),
            self.avg_latency_ms,
            self.p50_latency_ms,
            self.p95_latency_ms,
            self.p99_latency_ms,
            self.throughput_items_per_sec,
            self.peak_memory_mb,
            self.sample_count,
            self.failure_count
        )
    }
}

/// A named set of trusted records, one per scenario. Replaced wholesale on
/// re-baseline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub name: String,
    pub created_at: u64,
    pub records: BTreeMap<String, MetricsRecord>,
}

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

impl Baseline {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: name.into(),
            created_at: unix_now(),
            records: BTreeMap::new(),
        }
    }

    pub fn from_records<T, I>(name: T, records: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = MetricsRecord>,
    {
        let mut baseline = Self::new(name);
        for record in records {
            baseline.insert(record);
        }
        baseline
    }

    /// Inserts or replaces the record for its scenario.
    pub fn insert(&mut self, record: MetricsRecord) {
        self.records.insert(record.key().to_string(), record);
    }

    pub fn get(&self, key: &ScenarioKey) -> Option<&MetricsRecord> {
        self.records.get(&key.to_string())
    }

    pub fn scenarios(&self) -> impl Iterator<Item = ScenarioKey> + '_ {
        self.records.values().map(MetricsRecord::key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Baseline names double as file names, so only a conservative character
/// set is accepted.
pub fn validate_baseline_name(name: &str) -> Result<(), HarnessError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(HarnessError::invalid_scenario(format!(
            "invalid baseline name {name:?}"
        )))
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
