//! Beneficiary tracking for a solar pump subsidy scheme
//!
//! Records move through a fixed chain of stages (registration, work order,
//! sanction, ... payment). Every stage's worklist is derived from storage:
//! the previous stage's history minus the serial numbers this stage already
//! completed. See [`pipeline`] for the engine and [`repository`] for the
//! local and spreadsheet-backed stores.

pub mod columns;
pub mod config;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod record;
pub mod repository;

pub use config::{StoreBackend, TrackerConfig, TrackerConfigBuilder};
pub use error::{PumpTrackError, TrackResult};
pub use pipeline::{Pipeline, StageCatalog, StageView};
pub use record::{FieldSet, Record};
pub use repository::{RecordStore, RecordStoreFactory};

#[doc(hidden)]
pub use log;

use std::path::Path;

/// Build a pipeline over the store a config describes
pub fn open_pipeline(config: &TrackerConfig, catalog: StageCatalog) -> TrackResult<Pipeline> {
    let store = RecordStoreFactory::from_config(config, &catalog)?;
    let pipeline = Pipeline::builder(store)
        .catalog(catalog)
        .serial_generator(config.serials.generator())
        .build();

    app_log!(
        LogLevel::Info,
        "pumptrack",
        "Pipeline ready with {} stage(s)",
        pipeline.catalog().len()
    );
    Ok(pipeline)
}

/// Load a config file, apply environment overrides, and open the solar pump
/// pipeline it describes
pub fn open_from_file(path: impl AsRef<Path>) -> TrackResult<Pipeline> {
    let mut config = TrackerConfig::load(path)?;
    config.apply_env_overrides()?;
    open_pipeline(&config, StageCatalog::solar_pump())
}
