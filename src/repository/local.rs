//! Local record store over a string key-value backend
//!
//! Collections are stored as JSON arrays under `<prefix><collection>`, the
//! same layout the admin panel kept in browser local storage.

use super::traits::{KeyValueBackend, RecordStore};
use crate::app_log;
use crate::error::{PumpTrackError, TrackResult};
use crate::record::Record;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Record store keeping each collection as a JSON string in a key-value backend
pub struct LocalRecordStore<K: KeyValueBackend> {
    backend: K,
    key_prefix: String,
}

impl<K: KeyValueBackend> LocalRecordStore<K> {
    pub fn new(backend: K) -> Self {
        Self::with_prefix(backend, "")
    }

    pub fn with_prefix(backend: K, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, collection: &str) -> String {
        format!("{}{}", self.key_prefix, collection)
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }
}

#[async_trait]
impl<K: KeyValueBackend> RecordStore for LocalRecordStore<K> {
    async fn load(&self, collection: &str) -> TrackResult<Vec<Record>> {
        let key = self.key(collection);
        let raw = self
            .backend
            .get(&key)
            .map_err(|e| PumpTrackError::LoadFailed {
                collection: collection.to_string(),
                reason: e.to_string(),
            })?;

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Vec::new());
        }

        serde_json::from_str(trimmed).map_err(|e| PumpTrackError::LoadFailed {
            collection: collection.to_string(),
            reason: format!("invalid JSON under key '{}': {}", key, e),
        })
    }

    async fn save(&self, collection: &str, records: &[Record]) -> TrackResult<()> {
        let json = serde_json::to_string(records)?;
        self.backend
            .set(&self.key(collection), &json)
            .map_err(|e| PumpTrackError::PersistFailed {
                collection: collection.to_string(),
                reason: e.to_string(),
            })?;

        app_log!(
            LogLevel::Debug,
            "store::local",
            "Saved {} record(s) to '{}'",
            records.len(),
            collection
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// Process-local key-value map; contents vanish with the process
#[derive(Debug, Default)]
pub struct MemoryKeyValue {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryKeyValue {
    fn get(&self, key: &str) -> TrackResult<Option<String>> {
        Ok(self.values.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TrackResult<()> {
        self.values
            .lock()?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> TrackResult<()> {
        self.values.lock()?.remove(key);
        Ok(())
    }
}

/// Key-value map persisted as one JSON object file
///
/// Every write rewrites the file through a sibling temp file and a rename,
/// so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileKeyValue {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileKeyValue {
    /// Open the store file, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> TrackResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> TrackResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueBackend for JsonFileKeyValue {
    fn get(&self, key: &str) -> TrackResult<Option<String>> {
        Ok(self.values.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TrackResult<()> {
        let mut values = self.values.lock()?;
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&values) {
            // Keep memory in line with disk
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> TrackResult<()> {
        let mut values = self.values.lock()?;
        if let Some(old) = values.remove(key) {
            if let Err(e) = self.flush(&values) {
                values.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldSet;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let store = LocalRecordStore::new(MemoryKeyValue::new());
        assert!(store.load("sanction").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_keeps_order() {
        let store = LocalRecordStore::with_prefix(MemoryKeyValue::new(), "pump:");
        let records = vec![
            Record::with_fields("A2", &FieldSet::new().with("note", "ok")),
            Record::new("A1"),
        ];
        store.save("sanction", &records).await.unwrap();

        assert!(store.backend().has_key("pump:sanction").unwrap());
        assert_eq!(store.load("sanction").await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_corrupt_collection_is_load_failure() {
        let kv = MemoryKeyValue::new();
        kv.set("sanction", "{not json").unwrap();
        let store = LocalRecordStore::new(kv);

        let err = store.load("sanction").await.unwrap_err();
        assert!(matches!(err, PumpTrackError::LoadFailed { .. }));
    }

    #[tokio::test]
    async fn test_null_value_reads_empty() {
        let kv = MemoryKeyValue::new();
        kv.set("sanction", "null").unwrap();
        let store = LocalRecordStore::new(kv);
        assert!(store.load("sanction").await.unwrap().is_empty());
    }

    #[test]
    fn test_json_file_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("pumptrack-store.json");

        let kv = JsonFileKeyValue::open(&path).unwrap();
        kv.set("registration", "[]").unwrap();
        kv.set("intake", r#"[{"serialNo":"R1"}]"#).unwrap();
        kv.remove("registration").unwrap();

        let reopened = JsonFileKeyValue::open(&path).unwrap();
        assert_eq!(
            reopened.get("intake").unwrap().as_deref(),
            Some(r#"[{"serialNo":"R1"}]"#)
        );
        assert!(!reopened.has_key("registration").unwrap());
    }

    #[test]
    fn test_json_file_rejects_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(JsonFileKeyValue::open(&path).is_err());
    }
}
