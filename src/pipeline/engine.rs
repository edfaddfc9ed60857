use super::catalog::StageCatalog;
use super::clock::{Clock, SystemClock};
use super::serial::{SequentialSerials, SerialGenerator};
use super::stage::{StageDefinition, INTAKE_COLLECTION};
use super::view::{derive_pending, PipelineSummary, RecordTrace, StageSummary, StageView};
use crate::error::{PumpTrackError, TrackResult};
use crate::logger::{LogEntry, LogLevel, LOGGER};
use crate::record::{FieldSet, Record, SERIAL_NO_FIELD};
use crate::repository::RecordStore;
use futures::future::join_all;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Stage pipeline over a record store
///
/// Views are derived fresh from storage on every call; nothing is cached.
/// Writes (`complete`, `register`, `import_intake`) are serialized and run on
/// a spawned task, so a write that has started finishes even if the caller
/// stops waiting for it.
///
/// # Example
/// ```no_run
/// use pumptrack_lib::pipeline::Pipeline;
/// use pumptrack_lib::record::FieldSet;
/// use pumptrack_lib::repository::{LocalRecordStore, MemoryKeyValue};
/// use std::sync::Arc;
///
/// # async fn demo() -> pumptrack_lib::error::TrackResult<()> {
/// let store = Arc::new(LocalRecordStore::new(MemoryKeyValue::new()));
/// let pipeline = Pipeline::builder(store).build();
///
/// let record = pipeline
///     .register(FieldSet::new().with("beneficiaryName", "Asha Devi"))
///     .await?;
/// let view = pipeline.view("work_order").await?;
/// assert!(view.is_pending(record.serial_no()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
    write_lock: Arc<Mutex<()>>,
}

struct Shared {
    catalog: StageCatalog,
    store: Arc<dyn RecordStore>,
    serials: Arc<dyn SerialGenerator>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder(store: Arc<dyn RecordStore>) -> PipelineBuilder {
        PipelineBuilder::new(store)
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.shared.catalog
    }

    /// Pending and history of a stage.
    ///
    /// Collections that fail to load are treated as empty and the view is
    /// flagged `degraded`.
    pub async fn view(&self, stage: &str) -> TrackResult<StageView> {
        let def = self.shared.catalog.get(stage)?;

        let (upstream, upstream_ok) = self.shared.load_soft(def.source_collection()).await;
        let (history, history_ok) = self.shared.load_soft(def.history_collection()).await;
        let pending = derive_pending(&upstream, &history);

        Ok(StageView {
            stage: def.name.clone(),
            pending,
            history,
            degraded: !(upstream_ok && history_ok),
        })
    }

    /// Records waiting at a stage
    pub async fn pending(&self, stage: &str) -> TrackResult<Vec<Record>> {
        Ok(self.view(stage).await?.pending)
    }

    /// Records completed at a stage, most recent first
    pub async fn history(&self, stage: &str) -> TrackResult<Vec<Record>> {
        Ok(self.view(stage).await?.history)
    }

    /// Complete `serial_no` at `stage` with the submitted form fields.
    ///
    /// Pending is re-derived from storage under the write lock, so a serial
    /// that was already completed (or never reached this stage) is rejected
    /// with `PumpTrackError::NotPending` and history is left unchanged.
    pub async fn complete(
        &self,
        stage: &str,
        serial_no: &str,
        fields: FieldSet,
    ) -> TrackResult<Record> {
        let shared = Arc::clone(&self.shared);
        let lock = Arc::clone(&self.write_lock);
        let stage = stage.to_string();
        let serial_no = serial_no.to_string();

        tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            shared.complete_locked(&stage, &serial_no, &fields).await
        })
        .await?
    }

    /// Register a new beneficiary at the first stage with a fresh serial number
    pub async fn register(&self, fields: FieldSet) -> TrackResult<Record> {
        let shared = Arc::clone(&self.shared);
        let lock = Arc::clone(&self.write_lock);

        tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            shared.register_locked(&fields).await
        })
        .await?
    }

    /// Append raw records to the intake collection feeding the first stage.
    ///
    /// Records whose serial is already in intake are skipped. Returns the
    /// number of records added.
    pub async fn import_intake(&self, records: Vec<Record>) -> TrackResult<usize> {
        let shared = Arc::clone(&self.shared);
        let lock = Arc::clone(&self.write_lock);

        tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            shared.import_locked(records).await
        })
        .await?
    }

    /// Pending/completed counts for every stage
    pub async fn summary(&self) -> PipelineSummary {
        let collections = self.shared.load_all_soft().await;
        let empty = Vec::new();

        let stages = self
            .shared
            .catalog
            .iter()
            .map(|def| {
                let upstream = collections.get(def.source_collection()).unwrap_or(&empty);
                let history = collections.get(def.history_collection()).unwrap_or(&empty);
                StageSummary {
                    stage: def.name.clone(),
                    label: def.label.clone(),
                    pending: derive_pending(upstream, history).len(),
                    completed: history.len(),
                }
            })
            .collect();

        PipelineSummary { stages }
    }

    /// Recent pipeline activity from the shared log, newest first.
    ///
    /// With `serial_no`, only entries about that beneficiary are returned.
    pub fn recent_activity(&self, serial_no: Option<&str>) -> Vec<LogEntry> {
        LOGGER
            .recent("pipeline")
            .into_iter()
            .filter(|entry| serial_no.is_none() || entry.serial_no() == serial_no)
            .collect()
    }

    /// Where a serial number stands across the chain
    pub async fn trace(&self, serial_no: &str) -> RecordTrace {
        let collections = self.shared.load_all_soft().await;
        let find = |collection: &str| {
            collections
                .get(collection)
                .and_then(|records| records.iter().find(|r| r.serial_no() == serial_no))
        };

        let mut completed_stages = Vec::new();
        let mut pending_stage = None;
        let mut latest = find(INTAKE_COLLECTION).cloned();

        for def in self.shared.catalog.iter() {
            if let Some(record) = find(def.history_collection()) {
                completed_stages.push(def.name.clone());
                latest = Some(record.clone());
            } else if pending_stage.is_none() && find(def.source_collection()).is_some() {
                pending_stage = Some(def.name.clone());
            }
        }

        RecordTrace {
            serial_no: serial_no.to_string(),
            completed_stages,
            pending_stage,
            latest,
        }
    }
}

impl Shared {
    /// Load a collection, degrading to empty on failure
    async fn load_soft(&self, collection: &str) -> (Vec<Record>, bool) {
        match self.store.load(collection).await {
            Ok(records) => (records, true),
            Err(e) => {
                LOGGER.log(
                    LogLevel::Warn,
                    &format!(
                        "Load of '{}' from {} store failed, treating as empty: {}",
                        collection,
                        self.store.backend_name(),
                        e
                    ),
                    "pipeline",
                );
                (Vec::new(), false)
            }
        }
    }

    /// Load a collection for a write; failures abort the write
    async fn load_strict(&self, collection: &str) -> TrackResult<Vec<Record>> {
        self.store
            .load(collection)
            .await
            .map_err(|e| match e {
                PumpTrackError::LoadFailed { .. } => e,
                other => PumpTrackError::LoadFailed {
                    collection: collection.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    async fn persist(&self, collection: &str, records: &[Record]) -> TrackResult<()> {
        self.store
            .save(collection, records)
            .await
            .map_err(|e| match e {
                PumpTrackError::PersistFailed { .. } => e,
                other => PumpTrackError::PersistFailed {
                    collection: collection.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    /// Intake plus every stage history, loaded concurrently
    async fn load_all_soft(&self) -> HashMap<String, Vec<Record>> {
        let mut names = vec![INTAKE_COLLECTION];
        names.extend(self.catalog.iter().map(|def| def.history_collection()));

        let loaded = join_all(names.iter().map(|name| self.load_soft(name))).await;
        names
            .into_iter()
            .zip(loaded)
            .map(|(name, (records, _))| (name.to_string(), records))
            .collect()
    }

    async fn complete_locked(
        &self,
        stage: &str,
        serial_no: &str,
        fields: &FieldSet,
    ) -> TrackResult<Record> {
        let def = self.catalog.get(stage)?;
        validate_fields(def, fields)?;

        let upstream = self.load_strict(def.source_collection()).await?;
        let history = self.load_strict(def.history_collection()).await?;
        let pending = derive_pending(&upstream, &history);

        let source = pending
            .iter()
            .find(|r| r.serial_no() == serial_no)
            .ok_or_else(|| PumpTrackError::NotPending {
                stage: def.name.clone(),
                serial_no: serial_no.to_string(),
            })?;

        let completed = source.merged(fields, &def.completion_field, &self.clock.timestamp());

        let mut next = Vec::with_capacity(history.len() + 1);
        next.push(completed.clone());
        next.extend(history);
        self.persist(def.history_collection(), &next).await?;

        LOGGER.log_with_context(
            LogLevel::Info,
            &format!("Completed {} at stage '{}'", serial_no, def.name),
            "pipeline",
            HashMap::from([
                ("stage".to_string(), json!(def.name)),
                ("serialNo".to_string(), json!(serial_no)),
                ("fields".to_string(), json!(fields.len())),
            ]),
        );

        Ok(completed)
    }

    async fn register_locked(&self, fields: &FieldSet) -> TrackResult<Record> {
        let def = self.catalog.first();
        validate_fields(def, fields)?;

        let history = self.load_strict(def.history_collection()).await?;
        let intake = self.load_strict(INTAKE_COLLECTION).await?;

        let mut known: Vec<Record> = history.clone();
        known.extend(intake);
        let serial_no = self.serials.next_serial(&known);
        if known.iter().any(|r| r.serial_no() == serial_no) {
            return Err(PumpTrackError::DuplicateSerial {
                collection: def.history_collection().to_string(),
                serial_no,
            });
        }

        let record =
            Record::new(serial_no.as_str()).merged(fields, &def.completion_field, &self.clock.timestamp());

        let mut next = Vec::with_capacity(history.len() + 1);
        next.push(record.clone());
        next.extend(history);
        self.persist(def.history_collection(), &next).await?;

        LOGGER.log_with_context(
            LogLevel::Info,
            &format!("Registered {} at stage '{}'", serial_no, def.name),
            "pipeline",
            HashMap::from([
                ("stage".to_string(), json!(def.name)),
                ("serialNo".to_string(), json!(serial_no)),
            ]),
        );

        Ok(record)
    }

    async fn import_locked(&self, records: Vec<Record>) -> TrackResult<usize> {
        let mut intake = self.load_strict(INTAKE_COLLECTION).await?;
        let mut seen: HashSet<String> = intake.iter().map(|r| r.serial_no().to_string()).collect();

        let before = intake.len();
        for record in records {
            if seen.insert(record.serial_no().to_string()) {
                intake.push(record);
            }
        }
        let added = intake.len() - before;

        if added > 0 {
            self.persist(INTAKE_COLLECTION, &intake).await?;
        }

        LOGGER.log(
            LogLevel::Info,
            &format!("Imported {} intake record(s)", added),
            "pipeline",
        );
        Ok(added)
    }
}

/// Reject form fields the engine owns; note fields the stage does not declare
fn validate_fields(def: &StageDefinition, fields: &FieldSet) -> TrackResult<()> {
    for name in fields.keys() {
        if name == SERIAL_NO_FIELD || name == def.completion_field {
            return Err(PumpTrackError::InvalidFields(format!(
                "'{}' is set by the pipeline and cannot be submitted for stage '{}'",
                name, def.name
            )));
        }
        if !def.contributes(name) {
            LOGGER.log(
                LogLevel::Debug,
                &format!("Stage '{}' received undeclared field '{}'", def.name, name),
                "pipeline",
            );
        }
    }
    Ok(())
}

/// Builder for constructing pipelines
pub struct PipelineBuilder {
    store: Arc<dyn RecordStore>,
    catalog: Option<StageCatalog>,
    serials: Option<Arc<dyn SerialGenerator>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PipelineBuilder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            catalog: None,
            serials: None,
            clock: None,
        }
    }

    /// Use a custom stage table (defaults to the solar pump chain)
    pub fn catalog(mut self, catalog: StageCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn serials<G: SerialGenerator + 'static>(mut self, serials: G) -> Self {
        self.serials = Some(Arc::new(serials));
        self
    }

    pub fn serial_generator(mut self, serials: Arc<dyn SerialGenerator>) -> Self {
        self.serials = Some(serials);
        self
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            shared: Arc::new(Shared {
                catalog: self.catalog.unwrap_or_else(StageCatalog::solar_pump),
                store: self.store,
                serials: self
                    .serials
                    .unwrap_or_else(|| Arc::new(SequentialSerials::default())),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            }),
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}
