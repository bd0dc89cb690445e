//! JSON File Store
//!
//! Persistent arrays kept in a single JSON object keyed by array name and
//! rewritten on every change.

use bml_engine::{PersistentStore, StorageError, StoredArray};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File-backed persistent store
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    arrays: BTreeMap<String, StoredArray>,
}

impl JsonFileStore {
    /// Open a store, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let arrays = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StorageError::Format(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Opened persistent store {} ({} arrays)", path.display(), arrays.len());
        Ok(Self { path, arrays })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(&self.arrays).map_err(|e| StorageError::Format(e.to_string()))?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl PersistentStore for JsonFileStore {
    fn load(&self, name: &str) -> Result<Option<StoredArray>, StorageError> {
        Ok(self.arrays.get(name).cloned())
    }

    fn save(&mut self, name: &str, array: StoredArray) -> Result<(), StorageError> {
        self.arrays.insert(name.to_string(), array);
        self.flush()
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        if self.arrays.remove(name).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bml_engine::PersistentValue;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bml-store-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_survives_reopen() {
        let path = temp_path("reopen");
        let array = StoredArray {
            structure: "S:8V,U:2B,B:1B".to_string(),
            values: vec![
                PersistentValue::Text("viewer".to_string()),
                PersistentValue::Number(42.0),
                PersistentValue::Bool(true),
            ],
            expires_at: None,
        };

        let mut store = JsonFileStore::open(&path).unwrap();
        store.save("nvram://local/settings", array.clone()).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.load("nvram://local/settings").unwrap(), Some(array));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_remove() {
        let path = temp_path("remove");
        let mut store = JsonFileStore::open(&path).unwrap();
        let array = StoredArray {
            structure: "Z:1B".to_string(),
            values: vec![PersistentValue::Number(-1.0)],
            expires_at: Some(1),
        };
        store.save("a", array).unwrap();
        store.remove("a").unwrap();
        assert_eq!(JsonFileStore::open(&path).unwrap().load("a").unwrap(), None);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_corrupt_file() {
        let path = temp_path("corrupt");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StorageError::Format(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
