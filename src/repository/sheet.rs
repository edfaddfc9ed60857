//! Record store backed by one shared spreadsheet
//!
//! All stages live in the same sheet: one row per beneficiary, one column per
//! field. A stage's history is the set of rows whose completion column is
//! filled; the intake collection is every row with a serial number. Saving a
//! collection turns into per-row partial updates of the cells that changed.

use super::rpc::{Grid, SheetRpc};
use super::traits::RecordStore;
use crate::app_log;
use crate::columns::{ColumnMap, ColumnResolver};
use crate::error::{PumpTrackError, TrackResult};
use crate::pipeline::{StageCatalog, INTAKE_COLLECTION};
use crate::record::{Record, SERIAL_NO_FIELD};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Split a camelCase field name into lowercase header keywords
///
/// `beneficiaryName` → `["beneficiary", "name"]`
pub fn field_keywords(field: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in field.chars() {
        if (ch.is_uppercase() || ch == '_') && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        if ch != '_' {
            current.extend(ch.to_lowercase());
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Mapping between sheet rows and records under a resolved header
pub struct SheetLayout<'a> {
    grid: &'a Grid,
    columns: ColumnMap,
}

impl<'a> SheetLayout<'a> {
    pub fn new(grid: &'a Grid, resolver: &ColumnResolver) -> Self {
        Self {
            grid,
            columns: resolver.resolve(grid),
        }
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    fn data_rows(&self) -> impl Iterator<Item = (usize, &'a Vec<String>)> + '_ {
        let start = self.columns.header_row().map(|h| h + 1).unwrap_or(0);
        let grid = self.grid;
        (start..grid.len()).map(move |idx| (idx, &grid[idx]))
    }

    /// Records for every data row with a serial, paired with their grid index
    pub fn records(&self) -> TrackResult<Vec<(usize, Record)>> {
        if !self.columns.is_resolved(SERIAL_NO_FIELD) {
            return Err(PumpTrackError::InvalidFields(
                "sheet has no serial number column".to_string(),
            ));
        }

        let mut records = Vec::new();
        for (idx, row) in self.data_rows() {
            let serial = self.columns.read(row, SERIAL_NO_FIELD).trim();
            if serial.is_empty() {
                continue;
            }
            let mut map = Map::new();
            for (field, col) in self.columns.resolved() {
                if let Some(cell) = row.get(col) {
                    if !cell.trim().is_empty() {
                        map.insert(field.to_string(), Value::String(cell.clone()));
                    }
                }
            }
            map.insert(SERIAL_NO_FIELD.to_string(), Value::String(serial.to_string()));
            records.push((idx, Record::try_from(map)?));
        }
        Ok(records)
    }

    /// Grid index of the row holding `serial_no`
    pub fn row_of(&self, serial_no: &str) -> Option<usize> {
        self.data_rows()
            .find(|(_, row)| self.columns.read(row, SERIAL_NO_FIELD).trim() == serial_no)
            .map(|(idx, _)| idx)
    }

    /// `{column: value}` for resolved fields whose value differs from the row
    pub fn patch_for(&self, grid_index: usize, record: &Record) -> BTreeMap<usize, String> {
        let empty = Vec::new();
        let row = self.grid.get(grid_index).unwrap_or(&empty);
        let mut patch = BTreeMap::new();
        for (field, value) in record.iter() {
            if field == SERIAL_NO_FIELD {
                continue;
            }
            let value = value.unwrap_or("");
            if self.columns.read(row, field) != value {
                self.columns.write(&mut patch, field, value);
            }
        }
        patch
    }
}

/// Remote sheet implementation of [`RecordStore`]
pub struct SheetRecordStore {
    rpc: Arc<dyn SheetRpc>,
    sheet_name: String,
    resolver: ColumnResolver,
    /// collection → field that must be filled for a row to belong to it
    bindings: HashMap<String, Option<String>>,
}

impl SheetRecordStore {
    pub fn new(rpc: Arc<dyn SheetRpc>, sheet_name: impl Into<String>, resolver: ColumnResolver) -> Self {
        let mut bindings = HashMap::new();
        bindings.insert(INTAKE_COLLECTION.to_string(), None);
        Self {
            rpc,
            sheet_name: sheet_name.into(),
            resolver,
            bindings,
        }
    }

    /// Bind a collection to the rows whose `filter_field` is filled
    pub fn bind(mut self, collection: impl Into<String>, filter_field: impl Into<String>) -> Self {
        self.bindings
            .insert(collection.into(), Some(filter_field.into()));
        self
    }

    /// Store covering every stage of a catalog.
    ///
    /// Columns are resolved from the camelCase words of each field name unless
    /// `keyword_overrides` names the field.
    pub fn for_catalog(
        rpc: Arc<dyn SheetRpc>,
        sheet_name: impl Into<String>,
        resolver: ColumnResolver,
        catalog: &StageCatalog,
        keyword_overrides: &BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut resolver = resolver;
        for field in catalog.all_fields() {
            let keywords = keyword_overrides
                .get(field)
                .cloned()
                .unwrap_or_else(|| field_keywords(field));
            resolver = resolver.field(field, keywords);
        }

        let mut store = Self::new(rpc, sheet_name, resolver);
        for stage in catalog.iter() {
            store = store.bind(stage.history_collection(), stage.completion_field.clone());
        }
        store
    }

    fn binding(&self, collection: &str) -> Option<&Option<String>> {
        self.bindings.get(collection)
    }

    async fn read_grid(&self) -> TrackResult<Grid> {
        let grid = self.rpc.read(&self.sheet_name).await?;
        if grid.is_empty() {
            return Err(PumpTrackError::HeaderNotFound(self.sheet_name.clone()));
        }
        Ok(grid)
    }
}

#[async_trait]
impl RecordStore for SheetRecordStore {
    async fn load(&self, collection: &str) -> TrackResult<Vec<Record>> {
        let load_failed = |reason: String| PumpTrackError::LoadFailed {
            collection: collection.to_string(),
            reason,
        };

        let filter = self
            .binding(collection)
            .ok_or_else(|| load_failed("collection is not bound to the sheet".to_string()))?;
        let grid = self.read_grid().await.map_err(|e| load_failed(e.to_string()))?;
        let layout = SheetLayout::new(&grid, &self.resolver);
        let rows = layout.records().map_err(|e| load_failed(e.to_string()))?;

        let mut records: Vec<Record> = rows
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| match filter {
                Some(field) => record.is_filled(field),
                None => true,
            })
            .collect();

        // History collections are most-recent-first
        if let Some(field) = filter {
            records.sort_by(|a, b| b.get_or_empty(field).cmp(a.get_or_empty(field)));
        }
        Ok(records)
    }

    async fn save(&self, collection: &str, records: &[Record]) -> TrackResult<()> {
        let persist_failed = |reason: String| PumpTrackError::PersistFailed {
            collection: collection.to_string(),
            reason,
        };

        if self.binding(collection).is_none() {
            return Err(persist_failed(
                "collection is not bound to the sheet".to_string(),
            ));
        }

        let grid = self
            .read_grid()
            .await
            .map_err(|e| persist_failed(e.to_string()))?;
        let layout = SheetLayout::new(&grid, &self.resolver);
        if !layout.columns().is_resolved(SERIAL_NO_FIELD) {
            return Err(persist_failed(
                "sheet has no serial number column".to_string(),
            ));
        }

        // Plan every update before sending any, so a missing row aborts cleanly
        let mut updates = Vec::new();
        for record in records {
            let idx = layout.row_of(record.serial_no()).ok_or_else(|| {
                persist_failed(
                    PumpTrackError::SerialNotInSheet(record.serial_no().to_string()).to_string(),
                )
            })?;
            let patch = layout.patch_for(idx, record);
            if !patch.is_empty() {
                updates.push((idx + 1, patch));
            }
        }

        for (row_index, patch) in &updates {
            self.rpc
                .update(&self.sheet_name, *row_index, patch)
                .await
                .map_err(|e| persist_failed(format!("row {}: {}", row_index, e)))?;
        }

        app_log!(
            LogLevel::Info,
            "store::sheet",
            "Saved '{}': {} row update(s) to sheet '{}'",
            collection,
            updates.len(),
            self.sheet_name
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sheet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::HeaderDetection;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn resolver() -> ColumnResolver {
        ColumnResolver::new(HeaderDetection::default())
            .field("serialNo", ["serial"])
            .field("village", ["village"])
            .field("regId", ["reg", "id"])
            .field("note", ["note"])
    }

    #[test]
    fn test_field_keywords() {
        assert_eq!(field_keywords("beneficiaryName"), vec!["beneficiary", "name"]);
        assert_eq!(field_keywords("serialNo"), vec!["serial", "no"]);
        assert_eq!(field_keywords("jcc_status"), vec!["jcc", "status"]);
        assert_eq!(field_keywords("village"), vec!["village"]);
    }

    #[test]
    fn test_layout_records_skip_blank_serials() {
        let grid = grid(&[
            &["District report"],
            &["Serial No", "Reg ID", "Village", "Note"],
            &["SN-1", "R-1", "Rampur", ""],
            &["", "R-2", "Sitapur", ""],
            &["SN-3", "R-3", "", "ok"],
        ]);
        let layout = SheetLayout::new(&grid, &resolver());
        let records = layout.records().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 2);
        assert_eq!(records[0].1.get("village"), Some("Rampur"));
        assert!(!records[1].1.has_field("village"));
        assert_eq!(records[1].1.get("note"), Some("ok"));
    }

    #[test]
    fn test_patch_contains_only_changed_resolved_cells() {
        let grid = grid(&[
            &["Serial No", "Reg ID", "Village", "Note"],
            &["SN-1", "R-1", "Rampur", ""],
        ]);
        let layout = SheetLayout::new(&grid, &resolver());
        let mut record = crate::record::FieldSet::new();
        record.set("village", "Rampur");
        record.set("note", "ok");
        record.set("policyNo", "P-1");
        let record = Record::with_fields("SN-1", &record);

        let idx = layout.row_of("SN-1").unwrap();
        let patch = layout.patch_for(idx, &record);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch[&3], "ok");
        assert!(layout.row_of("SN-9").is_none());
    }
}
