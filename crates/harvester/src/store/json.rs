use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Snapshot, StateStore};
use crate::error::StoreError;

/// Single pretty-printed JSON document holding the whole snapshot.
///
/// ```text
/// <data_directory>/
///   state.json
/// ```
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store file inside a data directory.
    pub fn in_directory<P: AsRef<Path>>(data_directory: P) -> Self {
        Self::new(data_directory.as_ref().join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No state file at {}, starting empty", self.path.display());
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Snapshot::default());
        }

        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let json = serde_json::to_string_pretty(snapshot)?;

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| self.io_error(&temp_path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| self.io_error(&temp_path, e))?;
        file.sync_all().map_err(|e| self.io_error(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(&self.path, e))?;

        Ok(())
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::populated_snapshot;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_directory(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_directory(dir.path().join("nested"));

        let snapshot = populated_snapshot();
        store.save(&snapshot).unwrap();

        let reopened = JsonFileStore::in_directory(dir.path().join("nested"));
        assert_eq!(reopened.load().unwrap(), snapshot);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_directory(dir.path());

        store.save(&populated_snapshot()).unwrap();
        store.save(&Snapshot::default()).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_directory(dir.path());
        fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(
            store.load(),
            Err(StoreError::Serialization(_))
        ));
    }
}
