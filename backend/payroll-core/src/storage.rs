// src/storage.rs
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::persistence::{io_context, PersistenceError};

/// Flat key/value store the persistence layer writes through.
///
/// `set` must replace the value atomically: after an error the previous
/// value is still readable.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
    /// Returns whether the key existed.
    fn remove(&mut self, key: &str) -> Result<bool, PersistenceError>;
    fn keys(&self) -> Result<Vec<String>, PersistenceError>;

    /// Bytes currently held under `key`, 0 if absent.
    fn size_of(&self, key: &str) -> Result<u64, PersistenceError> {
        Ok(self.get(key)?.map(|v| v.len() as u64).unwrap_or(0))
    }

    /// Bytes held across every key.
    fn used_bytes(&self) -> Result<u64, PersistenceError> {
        let mut total = 0;
        for key in self.keys()? {
            total += self.size_of(&key)?;
        }
        Ok(total)
    }
}

fn check_key(key: &str) -> Result<(), PersistenceError> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PersistenceError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// --- File Storage ---

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| io_context(e, format!("Failed to create data directory: {:?}", dir)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| io_context(e, format!("Failed to read {:?}", path)))?;
        Ok(Some(contents))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| io_context(e, format!("Failed to create temp file in {:?}", self.dir)))?;
        temp_file
            .write_all(value.as_bytes())
            .and_then(|_| temp_file.as_file().sync_all())
            .map_err(|e| io_context(e, format!("Failed to write temp file for {:?}", path)))?;
        temp_file
            .persist(&path)
            .map_err(|e| io_context(e.error, format!("Failed to move temp file onto {:?}", path)))?;
        debug!("Wrote {} bytes to {:?}", value.len(), path);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, PersistenceError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| io_context(e, format!("Failed to remove {:?}", path)))?;
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| io_context(e, format!("Failed to list {:?}", self.dir)))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_context(e, format!("Failed to list {:?}", self.dir)))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if check_key(stem).is_ok() => keys.push(stem.to_string()),
                _ => warn!("Ignoring unexpected file in data directory: {:?}", path),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn size_of(&self, key: &str) -> Result<u64, PersistenceError> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(io_context(e, format!("Failed to stat {:?}", path))),
        }
    }
}

// --- In-Memory Storage ---

/// Map-backed store for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        check_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        check_key(key)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, PersistenceError> {
        check_key(key)?;
        Ok(self.entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_round_trips_and_lists_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path().join("data")).unwrap();

        assert_eq!(storage.get("payroll_data").unwrap(), None);
        storage.set("payroll_data", "{\"a\":1}").unwrap();
        storage.set("payroll_backup_1", "[]").unwrap();
        fs::write(storage.dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(storage.get("payroll_data").unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(storage.keys().unwrap(), vec!["payroll_backup_1", "payroll_data"]);
        assert_eq!(storage.size_of("payroll_data").unwrap(), 7);
        assert_eq!(storage.used_bytes().unwrap(), 9);

        storage.set("payroll_data", "{}").unwrap();
        assert_eq!(storage.get("payroll_data").unwrap().as_deref(), Some("{}"));

        assert!(storage.remove("payroll_data").unwrap());
        assert!(!storage.remove("payroll_data").unwrap());
        assert_eq!(storage.keys().unwrap(), vec!["payroll_backup_1"]);
    }

    #[test]
    fn keys_cannot_escape_the_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        assert!(matches!(
            storage.set("../evil", "x"),
            Err(PersistenceError::InvalidKey(_))
        ));
        assert!(matches!(
            MemoryStorage::new().get(""),
            Err(PersistenceError::InvalidKey(_))
        ));
    }

    #[test]
    fn memory_storage_counts_bytes() {
        let mut storage = MemoryStorage::new();
        storage.set("a", "12345").unwrap();
        storage.set("b", "678").unwrap();
        assert_eq!(storage.used_bytes().unwrap(), 8);
        assert_eq!(storage.size_of("missing").unwrap(), 0);
    }
}
