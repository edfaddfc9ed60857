//! Repository trait definitions
//!
//! These traits define the abstract interfaces for record persistence.
//! Different implementations can provide different storage backends.

use crate::error::TrackResult;
use crate::record::Record;
use async_trait::async_trait;

/// Named collections of records
///
/// Each stage's history lives in the collection named after the stage; the
/// first stage reads from the `intake` collection. The pipeline never assumes
/// which backend is active.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every record in a collection. A collection never written reads as empty.
    async fn load(&self, collection: &str) -> TrackResult<Vec<Record>>;

    /// Replace the contents of a collection
    async fn save(&self, collection: &str, records: &[Record]) -> TrackResult<()>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// String key-value storage with local-storage semantics
pub trait KeyValueBackend: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> TrackResult<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> TrackResult<()>;

    /// Remove a value
    fn remove(&self, key: &str) -> TrackResult<()>;

    /// Check if a key exists
    fn has_key(&self, key: &str) -> TrackResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
