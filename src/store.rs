//! Baseline persistence.
//!
//! A baseline is stored as one versioned JSON document keyed by scenario.
//! Saving a name replaces the whole document; nothing is merged, so records
//! captured under different conditions never end up side by side. Readers
//! observe either the previous document or the complete new one.

use std::collections::BTreeSet;

use tracing::warn;

use crate::{
    HarnessError,
    record::{Baseline, FORMAT_VERSION, MetricsRecord, ScenarioKey},
};

pub mod json;
pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

pub use json::JsonBaselineStore;
pub use memory::MemoryBaselineStore;
#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteBaselineStore;

pub trait BaselineStore: Send + Sync {
    /// Writes `baseline`, replacing any existing baseline of the same name.
    fn save(&self, baseline: &Baseline) -> Result<(), HarnessError>;

    /// Fails with [`HarnessError::BaselineNotFound`] when `name` was never saved.
    fn load(&self, name: &str) -> Result<Baseline, HarnessError>;

    fn list_baselines(&self) -> Result<Vec<String>, HarnessError>;

    fn load_record(&self, name: &str, key: &ScenarioKey) -> Result<MetricsRecord, HarnessError> {
        let baseline = self.load(name)?;
        baseline
            .get(key)
            .cloned()
            .ok_or_else(|| HarnessError::baseline_not_found(format!("{name}: scenario {key}")))
    }

    fn list_scenarios(&self, name: &str) -> Result<BTreeSet<ScenarioKey>, HarnessError> {
        Ok(self.load(name)?.scenarios().collect())
    }
}

impl<S: BaselineStore + ?Sized> BaselineStore for &S {
    fn save(&self, baseline: &Baseline) -> Result<(), HarnessError> {
        (**self).save(baseline)
    }

    fn load(&self, name: &str) -> Result<Baseline, HarnessError> {
        (**self).load(name)
    }

    fn list_baselines(&self) -> Result<Vec<String>, HarnessError> {
        (**self).list_baselines()
    }
}

impl<S: BaselineStore + ?Sized> BaselineStore for Box<S> {
    fn save(&self, baseline: &Baseline) -> Result<(), HarnessError> {
        (**self).save(baseline)
    }

    fn load(&self, name: &str) -> Result<Baseline, HarnessError> {
        (**self).load(name)
    }

    fn list_baselines(&self) -> Result<Vec<String>, HarnessError> {
        (**self).list_baselines()
    }
}

pub fn encode_document(baseline: &Baseline) -> Result<Vec<u8>, HarnessError> {
    serde_json::to_vec_pretty(baseline).map_err(|e| HarnessError::serialization(e.to_string()))
}

/// Parses a stored document. Unknown fields are ignored and documents from
/// newer harness versions are accepted, so older binaries can still read
/// them.
pub fn decode_document(name: &str, data: &[u8]) -> Result<Baseline, HarnessError> {
    let baseline = read_document(data)?;
    if baseline.name != name {
        return Err(HarnessError::storage(format!(
            "document for {name} is labelled {}",
            baseline.name
        )));
    }
    Ok(baseline)
}

/// Parses a document without checking which name it was stored under, e.g.
/// a results file handed over on the command line.
pub fn read_document(data: &[u8]) -> Result<Baseline, HarnessError> {
    let mut baseline: Baseline =
        serde_json::from_slice(data).map_err(|e| HarnessError::serialization(e.to_string()))?;
    if baseline.format_version > FORMAT_VERSION {
        warn!(
            baseline = %baseline.name,
            version = baseline.format_version,
            supported = FORMAT_VERSION,
            "baseline written by a newer harness; reading known fields only"
        );
    }
    // Re-key from the records themselves so a hand-edited key cannot point
    // at the wrong scenario.
    let records = std::mem::take(&mut baseline.records);
    for record in records.into_values() {
        baseline.insert(record);
    }
    Ok(baseline)
}
