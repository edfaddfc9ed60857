//! Record store factory
//!
//! Picks the backend named by a [`TrackerConfig`] and wires it up.

use super::local::{JsonFileKeyValue, LocalRecordStore, MemoryKeyValue};
use super::rpc::{HttpSheetRpc, SheetRpc};
use super::sheet::SheetRecordStore;
use super::traits::RecordStore;
use crate::app_log;
use crate::columns::ColumnResolver;
use crate::config::{StoreBackend, TrackerConfig};
use crate::error::TrackResult;
use crate::pipeline::StageCatalog;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct RecordStoreFactory;

impl RecordStoreFactory {
    /// Create the store a config describes
    pub fn from_config(
        config: &TrackerConfig,
        catalog: &StageCatalog,
    ) -> TrackResult<Arc<dyn RecordStore>> {
        let store: Arc<dyn RecordStore> = match &config.store {
            StoreBackend::Local { path, key_prefix } => {
                Self::create_local(path, key_prefix.clone())?
            }
            StoreBackend::RemoteSheet {
                endpoint,
                dataset_id,
                sheet_name,
                timeout_secs,
                retry,
            } => {
                let rpc = HttpSheetRpc::new(
                    endpoint.clone(),
                    dataset_id.clone(),
                    Duration::from_secs(*timeout_secs),
                    retry.clone(),
                )?;
                Self::create_sheet(Arc::new(rpc), sheet_name, config, catalog)
            }
        };

        app_log!(
            LogLevel::Info,
            "store",
            "Using '{}' record store",
            store.backend_name()
        );
        Ok(store)
    }

    /// File-backed local store
    pub fn create_local(
        path: impl AsRef<Path>,
        key_prefix: impl Into<String>,
    ) -> TrackResult<Arc<dyn RecordStore>> {
        let kv = JsonFileKeyValue::open(path)?;
        Ok(Arc::new(LocalRecordStore::with_prefix(kv, key_prefix)))
    }

    /// In-memory store; contents vanish with the process
    pub fn create_memory() -> Arc<dyn RecordStore> {
        Arc::new(LocalRecordStore::new(MemoryKeyValue::new()))
    }

    /// Sheet store over any RPC client, bound to every stage of `catalog`
    pub fn create_sheet(
        rpc: Arc<dyn SheetRpc>,
        sheet_name: &str,
        config: &TrackerConfig,
        catalog: &StageCatalog,
    ) -> Arc<dyn RecordStore> {
        let resolver = ColumnResolver::new(config.header.clone());
        Arc::new(SheetRecordStore::for_catalog(
            rpc,
            sheet_name,
            resolver,
            catalog,
            &config.column_keywords,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfigBuilder;
    use crate::record::Record;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_factory_creates_local_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrackerConfigBuilder::new()
            .local(temp_dir.path().join("store.json"))
            .build()
            .unwrap();

        let store = RecordStoreFactory::from_config(&config, &StageCatalog::solar_pump()).unwrap();
        assert_eq!(store.backend_name(), "local");

        store.save("intake", &[Record::new("SN-0001")]).await.unwrap();
        assert!(temp_dir.path().join("store.json").exists());
    }

    #[test]
    fn test_factory_creates_sheet_store() {
        let config = TrackerConfigBuilder::new()
            .remote_sheet("https://script.example.com/exec", "d1")
            .build()
            .unwrap();

        let store = RecordStoreFactory::from_config(&config, &StageCatalog::solar_pump()).unwrap();
        assert_eq!(store.backend_name(), "sheet");
    }

    #[tokio::test]
    async fn test_memory_store_starts_empty() {
        let store = RecordStoreFactory::create_memory();
        assert!(store.load("registration").await.unwrap().is_empty());
    }
}
