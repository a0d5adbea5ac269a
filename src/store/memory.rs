use std::sync::Arc;

use ahash::AHashMap;
use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::BaselineStore;
use crate::{
    HarnessError,
    record::{Baseline, validate_baseline_name},
};

type Snapshot = AHashMap<String, Arc<Baseline>>;

/// Process-local store. Readers load the current snapshot without locking;
/// writers build a new snapshot under a mutex and swap it in.
pub struct MemoryBaselineStore {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl Default for MemoryBaselineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(AHashMap::new()),
            write_lock: Mutex::new(()),
        }
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn save(&self, baseline: &Baseline) -> Result<(), HarnessError> {
        validate_baseline_name(&baseline.name)?;
        let _guard = self.write_lock.lock();
        let mut next: Snapshot = (**self.snapshot.load()).clone();
        next.insert(baseline.name.clone(), Arc::new(baseline.clone()));
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Baseline, HarnessError> {
        self.snapshot
            .load()
            .get(name)
            .map(|baseline| (**baseline).clone())
            .ok_or_else(|| HarnessError::baseline_not_found(name))
    }

    fn list_baselines(&self) -> Result<Vec<String>, HarnessError> {
        let mut names: Vec<String> = self.snapshot.load().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
