//! Record storage
//!
//! The pipeline only sees [`RecordStore`]: load a named collection, save it
//! back whole. Two backends implement it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              RecordStore                │
//! │    (load / save named collections)      │
//! └──────────────┬──────────────────────────┘
//!                │
//!        ┌───────┴──────────────┐
//!        │                      │
//! ┌──────▼────────────┐  ┌──────▼────────────┐
//! │LocalRecordStore   │  │SheetRecordStore   │
//! │                   │  │                   │
//! │- KeyValueBackend  │  │- SheetRpc         │
//! │- JSON per key     │  │- ColumnResolver   │
//! └───────────────────┘  └───────────────────┘
//! ```

pub mod factory;
pub mod local;
pub mod rpc;
pub mod sheet;
pub mod traits;

// Re-export main types
pub use factory::RecordStoreFactory;
pub use local::{JsonFileKeyValue, LocalRecordStore, MemoryKeyValue};
pub use rpc::{Grid, HttpSheetRpc, RetryPolicy, SheetRpc};
pub use sheet::{field_keywords, SheetLayout, SheetRecordStore};
pub use traits::{KeyValueBackend, RecordStore};
