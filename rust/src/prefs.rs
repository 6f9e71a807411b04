//! Key/value preferences used by the dialogs (reminder flags, counters).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{DiagError, Result};

pub const PREFS_FILE_NAME: &str = "diag_prefs.json";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn get_bool(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("true")
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Write-through store backed by a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open `<data_dir>/diag_prefs.json`. A missing or unreadable file starts
    /// empty; the next `set` rewrites it.
    pub fn open(data_dir: &str) -> Self {
        let path = Path::new(data_dir).join(PREFS_FILE_NAME);
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt prefs");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DiagError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        // Sibling + rename keeps the file whole on crash.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|source| DiagError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| DiagError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    // Memory only changes once the new contents are on disk.
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_typed_getters() {
        let store = MemoryStore::new();
        assert!(!store.get_bool("shown"));
        store.set("shown", "true").unwrap();
        store.set("days", " 30 ").unwrap();
        store.set("junk", "thirty").unwrap();
        assert!(store.get_bool("shown"));
        assert_eq!(store.get_i64("days"), Some(30));
        assert_eq!(store.get_i64("junk"), None);
        store.remove("shown").unwrap();
        assert_eq!(store.get("shown"), None);
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        {
            let store = JsonFileStore::open(data_dir);
            store.set("retention_days", "90").unwrap();
            store.set("temp", "x").unwrap();
            store.remove("temp").unwrap();
        }
        let store = JsonFileStore::open(data_dir);
        assert_eq!(store.get("retention_days").as_deref(), Some("90"));
        assert_eq!(store.get("temp"), None);
    }

    #[test]
    fn json_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PREFS_FILE_NAME), b"[1,2").unwrap();
        let store = JsonFileStore::open(dir.path().to_str().unwrap());
        assert_eq!(store.get("anything"), None);
        store.set("k", "v").unwrap();
        let reopened = JsonFileStore::open(dir.path().to_str().unwrap());
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn failed_write_leaves_entries_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = JsonFileStore::open(blocker.join("sub").to_str().unwrap());
        let err = store.set("retention_days", "90").unwrap_err();
        assert!(matches!(err, DiagError::Write { .. }));
        assert_eq!(store.get("retention_days"), None);
    }

    #[test]
    fn failed_remove_keeps_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = JsonFileStore::open(data_dir.to_str().unwrap());
        store.set("retention_days", "90").unwrap();

        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, b"not a directory").unwrap();

        assert!(store.remove("retention_days").is_err());
        assert_eq!(store.get("retention_days").as_deref(), Some("90"));
    }
}
