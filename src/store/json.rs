use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tracing::debug;

use super::{BaselineStore, decode_document, encode_document};
use crate::{
    HarnessError,
    record::{Baseline, validate_baseline_name},
};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One `<name>.json` file per baseline inside a directory.
///
/// Writes go to a unique temporary file in the same directory and are then
/// renamed over the target, so a concurrent reader never sees a partial
/// document.
pub struct JsonBaselineStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonBaselineStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, HarnessError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            HarnessError::storage(format!("create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn temp_path_for(&self, name: &str) -> PathBuf {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{name}.json.{}.{seq}.tmp", process::id()))
    }
}

impl BaselineStore for JsonBaselineStore {
    fn save(&self, baseline: &Baseline) -> Result<(), HarnessError> {
        validate_baseline_name(&baseline.name)?;
        let data = encode_document(baseline)?;
        let target = self.path_for(&baseline.name);
        let temp = self.temp_path_for(&baseline.name);

        let _guard = self.write_lock.lock();
        fs::write(&temp, &data)
            .map_err(|e| HarnessError::storage(format!("write {}: {e}", temp.display())))?;
        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(HarnessError::storage(format!(
                "replace {}: {e}",
                target.display()
            )));
        }
        debug!(
            baseline = %baseline.name,
            records = baseline.len(),
            path = %target.display(),
            "baseline written"
        );
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Baseline, HarnessError> {
        validate_baseline_name(name)?;
        let path = self.path_for(name);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(HarnessError::baseline_not_found(name));
            }
            Err(e) => {
                return Err(HarnessError::storage(format!("read {}: {e}", path.display())));
            }
        };
        decode_document(name, &data)
    }

    fn list_baselines(&self) -> Result<Vec<String>, HarnessError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| HarnessError::storage(format!("list {}: {e}", self.dir.display())))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HarnessError::storage(e.to_string()))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(".json") {
                if validate_baseline_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_baseline_is_not_found() {
        let dir = tempdir().unwrap();
        let store = JsonBaselineStore::open(dir.path()).unwrap();
        let err = store.load("absent").unwrap_err();
        assert!(err.is_baseline_not_found());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = JsonBaselineStore::open(dir.path()).unwrap();
        store.save(&Baseline::new("main")).unwrap();
        store.save(&Baseline::new("main")).unwrap();
        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec!["main.json".to_string()]);
        assert_eq!(store.list_baselines().unwrap(), vec!["main".to_string()]);
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = JsonBaselineStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.save(&Baseline::new("../escape")),
            Err(HarnessError::InvalidScenario(_))
        ));
    }
}
