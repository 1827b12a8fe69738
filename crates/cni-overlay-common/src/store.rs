//! Node-local table persistence.
//!
//! Each logical table is stored as one indented JSON document,
//! `<dir>/<table>.json`. The directory is expected to be memory-backed
//! (tmpfs), so state survives agent restarts but not host reboots.
//! A missing file on load means "no prior state".

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{OverlayError, OverlayResult};

/// Default node-local state directory.
pub const DEFAULT_STATE_DIR: &str = "/dev/shm/cni-overlay";

/// JSON file store, one file per table.
#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file backing `table`.
    pub fn path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.json", table))
    }

    /// Loads `table`, returning `T::default()` when the file does not exist.
    pub fn load<T>(&self, table: &str) -> OverlayResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(table);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No persisted state, starting empty");
                return Ok(T::default());
            }
            Err(e) => {
                return Err(OverlayError::persistence(
                    &path,
                    format!("Failed to read: {}", e),
                ))
            }
        };

        serde_json::from_str(&data)
            .map_err(|e| OverlayError::persistence(&path, format!("Failed to decode: {}", e)))
    }

    /// Writes the whole `table` snapshot.
    pub fn save<T>(&self, table: &str, value: &T) -> OverlayResult<()>
    where
        T: Serialize,
    {
        let path = self.path(table);
        fs::create_dir_all(&self.dir).map_err(|e| {
            OverlayError::persistence(&path, format!("Failed to create state directory: {}", e))
        })?;

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| OverlayError::persistence(&path, format!("Failed to encode: {}", e)))?;

        // Readers never observe a half-written snapshot.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| OverlayError::persistence(&tmp, format!("Failed to write: {}", e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| OverlayError::persistence(&path, format!("Failed to rename: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let table: BTreeMap<String, u32> = store.load("absent").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path().join("nested"));

        let mut table = BTreeMap::new();
        table.insert("a".to_string(), 1u32);
        table.insert("b".to_string(), 2u32);
        store.save("numbers", &table).unwrap();

        let loaded: BTreeMap<String, u32> = store.load("numbers").unwrap();
        assert_eq!(loaded, table);
        assert!(store.path("numbers").exists());
        assert!(!store.path("numbers").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_saved_file_is_indented() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let mut table = BTreeMap::new();
        table.insert("k".to_string(), 7u32);
        store.save("t", &table).unwrap();

        let raw = fs::read_to_string(store.path("t")).unwrap();
        assert_eq!(raw, "{\n  \"k\": 7\n}");
    }

    #[test]
    fn test_load_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        fs::write(store.path("bad"), "{not json").unwrap();

        let result: OverlayResult<BTreeMap<String, u32>> = store.load("bad");
        assert!(matches!(result, Err(OverlayError::Persistence { .. })));
    }
}
