//! Configuration for baseline storage and benchmark runs.
//!
//! Everything a run depends on (where baselines live, which baseline to
//! compare against, tolerances, iteration counts) is carried in these
//! structures and passed explicitly to [`crate::runner::BenchmarkRunner`].
//! There is no process-wide "current baseline".

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    HarnessError,
    compare::Tolerances,
    record::{LengthBucket, validate_baseline_name},
    store::{BaselineStore, JsonBaselineStore, MemoryBaselineStore},
};

/// Environment variable overriding the default store location.
pub const STORE_ENV_VAR: &str = "INFERBENCH_STORE";

pub const DEFAULT_ITERATIONS: usize = 20;
pub const DEFAULT_WARMUP_ITERATIONS: usize = 1;
pub const DEFAULT_BASELINE_NAME: &str = "default";

/// Storage implementation used for baselines.
///
/// # Default Behavior
///
/// [`StoreKind::Json`] keeps one human-readable file per baseline, which is
/// what most CI setups check into an artifact bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Directory of `<name>.json` documents.
    #[default]
    Json,
    /// Single SQLite file with one row per baseline.
    Sqlite,
    /// Process-local; nothing survives the process.
    Memory,
}

impl std::str::FromStr for StoreKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(StoreKind::Json),
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            other => Err(HarnessError::invalid_scenario(format!(
                "unknown store kind {other}"
            ))),
        }
    }
}

/// Where and how baselines are persisted.
///
/// ```rust
/// use inferbench::config::{StoreConfig, StoreKind};
///
/// let cfg = StoreConfig::new(StoreKind::Sqlite, "bench/baselines.db");
/// assert_eq!(cfg.kind, StoreKind::Sqlite);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Directory for [`StoreKind::Json`], database file for
    /// [`StoreKind::Sqlite`], ignored for [`StoreKind::Memory`].
    pub path: PathBuf,
}

impl StoreConfig {
    pub fn new<P: Into<PathBuf>>(kind: StoreKind, path: P) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn memory() -> Self {
        Self::new(StoreKind::Memory, PathBuf::new())
    }
}

impl Default for StoreConfig {
    /// JSON store at `$INFERBENCH_STORE`, falling back to `./bench-baselines`.
    fn default() -> Self {
        Self::new(StoreKind::Json, default_store_path())
    }
}

pub fn default_store_path() -> PathBuf {
    match env::var(STORE_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => Path::new("bench-baselines").to_path_buf(),
    }
}

/// Opens the store selected by `cfg`.
pub fn open_store(cfg: &StoreConfig) -> Result<Box<dyn BaselineStore>, HarnessError> {
    match cfg.kind {
        StoreKind::Json => Ok(Box::new(JsonBaselineStore::open(&cfg.path)?)),
        #[cfg(feature = "sqlite-store")]
        StoreKind::Sqlite => {
            if let Some(parent) = cfg.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HarnessError::storage(format!("create {}: {e}", parent.display()))
                })?;
            }
            Ok(Box::new(crate::store::SqliteBaselineStore::open(&cfg.path)?))
        }
        #[cfg(not(feature = "sqlite-store"))]
        StoreKind::Sqlite => Err(HarnessError::storage(
            "sqlite store requires the sqlite-store feature",
        )),
        StoreKind::Memory => Ok(Box::new(MemoryBaselineStore::new())),
    }
}

/// What a sweep does with its records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Save every record as the new baseline, replacing the old one.
    Baseline,
    /// Compare every record against the stored baseline.
    #[default]
    Compare,
}

/// How [`RunMode::Compare`] treats a baseline (or scenario) that does not exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingBaselinePolicy {
    /// Treat the run as the first one and save it as the baseline.
    Establish,
    /// Log a warning and skip the regression check.
    #[default]
    Warn,
}

/// Settings for one sweep.
///
/// # Default Configuration
///
/// ```rust
/// use inferbench::config::{RunMode, RunnerConfig};
///
/// let cfg = RunnerConfig::default();
/// assert_eq!(cfg.iterations, 20);
/// assert_eq!(cfg.warmup_iterations, 1);
/// assert_eq!(cfg.mode, RunMode::Compare);
/// assert!(cfg.sample_timeout.is_none());
/// assert!(!cfg.parallel_scenarios);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfig {
    /// Measured samples per scenario.
    pub iterations: usize,
    /// Unmeasured calls per scenario before sampling starts.
    pub warmup_iterations: usize,
    /// Upper bound on a single inference call. An expired call counts as a
    /// failed sample.
    pub sample_timeout: Option<Duration>,
    pub baseline_name: String,
    pub mode: RunMode,
    pub missing_baseline: MissingBaselinePolicy,
    pub tolerances: Tolerances,
    /// Run scenarios on separate threads. Honoured only when the target
    /// reports itself safe for concurrent calls.
    pub parallel_scenarios: bool,
    /// Seed for generated input batches.
    pub seed: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            warmup_iterations: DEFAULT_WARMUP_ITERATIONS,
            sample_timeout: None,
            baseline_name: DEFAULT_BASELINE_NAME.to_string(),
            mode: RunMode::Compare,
            missing_baseline: MissingBaselinePolicy::Warn,
            tolerances: Tolerances::default(),
            parallel_scenarios: false,
            seed: 0x5EED_F00D,
        }
    }
}

impl RunnerConfig {
    pub fn baseline<T: Into<String>>(name: T) -> Self {
        Self {
            baseline_name: name.into(),
            mode: RunMode::Baseline,
            ..Self::default()
        }
    }

    pub fn compare<T: Into<String>>(name: T) -> Self {
        Self {
            baseline_name: name.into(),
            mode: RunMode::Compare,
            ..Self::default()
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_warmup(mut self, warmup_iterations: usize) -> Self {
        self.warmup_iterations = warmup_iterations;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = Some(timeout);
        self
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn with_missing_baseline(mut self, policy: MissingBaselinePolicy) -> Self {
        self.missing_baseline = policy;
        self
    }

    pub fn with_parallel_scenarios(mut self, parallel: bool) -> Self {
        self.parallel_scenarios = parallel;
        self
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.iterations == 0 {
            return Err(HarnessError::invalid_scenario("iterations must be positive"));
        }
        if self.sample_timeout == Some(Duration::ZERO) {
            return Err(HarnessError::invalid_scenario("sample timeout must be positive"));
        }
        validate_baseline_name(&self.baseline_name)?;
        self.tolerances.validate()
    }
}

/// Scenarios to run for one component: every batch size crossed with every
/// length bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentSweep {
    pub batch_sizes: Vec<usize>,
    pub length_buckets: Vec<LengthBucket>,
}

impl Default for ComponentSweep {
    fn default() -> Self {
        Self {
            batch_sizes: vec![1, 8, 32, 64],
            length_buckets: LengthBucket::ALL.to_vec(),
        }
    }
}

impl ComponentSweep {
    pub fn new(batch_sizes: Vec<usize>, length_buckets: Vec<LengthBucket>) -> Self {
        Self {
            batch_sizes,
            length_buckets,
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.batch_sizes.is_empty() || self.length_buckets.is_empty() {
            return Err(HarnessError::invalid_scenario(
                "sweep needs at least one batch size and one length bucket",
            ));
        }
        if self.batch_sizes.contains(&0) {
            return Err(HarnessError::invalid_scenario("batch sizes must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_runner_config_validation() {
        assert!(RunnerConfig::default().validate().is_ok());
        assert!(RunnerConfig::default().with_iterations(0).validate().is_err());
        assert!(
            RunnerConfig::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(RunnerConfig::compare("bad name").validate().is_err());
    }

    #[test]
    fn test_sweep_validation() {
        assert!(ComponentSweep::default().validate().is_ok());
        assert!(ComponentSweep::new(vec![], LengthBucket::ALL.to_vec()).validate().is_err());
        assert!(ComponentSweep::new(vec![4, 0], vec![LengthBucket::Short]).validate().is_err());
    }

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("SQLite".parse::<StoreKind>().unwrap(), StoreKind::Sqlite);
        assert!("redis".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_open_each_store_kind() {
        let dir = tempdir().unwrap();
        let json = StoreConfig::new(StoreKind::Json, dir.path().join("json"));
        assert!(open_store(&json).is_ok());
        assert!(dir.path().join("json").is_dir());
        assert!(open_store(&StoreConfig::memory()).is_ok());
    }

    #[cfg(feature = "sqlite-store")]
    #[test]
    fn test_open_sqlite_store_creates_parent() {
        let dir = tempdir().unwrap();
        let sqlite = StoreConfig::new(StoreKind::Sqlite, dir.path().join("db/baselines.db"));
        assert!(open_store(&sqlite).is_ok());
        assert!(dir.path().join("db").is_dir());
    }

    #[cfg(not(feature = "sqlite-store"))]
    #[test]
    fn test_sqlite_store_needs_feature() {
        let sqlite = StoreConfig::new(StoreKind::Sqlite, "baselines.db");
        assert!(matches!(open_store(&sqlite), Err(HarnessError::Storage(_))));
    }
}
