use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pumptrack_lib::columns::HeaderDetection;
use pumptrack_lib::pipeline::{FixedClock, Pipeline, StageCatalog};
use pumptrack_lib::record::FieldSet;
use pumptrack_lib::repository::{Grid, RecordStoreFactory, SheetRpc};
use pumptrack_lib::{PumpTrackError, TrackResult, TrackerConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the spreadsheet web app
struct FakeSheet {
    grid: Mutex<Grid>,
    updates: Mutex<Vec<(usize, BTreeMap<usize, String>)>>,
    fail_reads: AtomicBool,
}

impl FakeSheet {
    fn new(rows: &[&[&str]]) -> Arc<Self> {
        Arc::new(Self {
            grid: Mutex::new(
                rows.iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
            ),
            updates: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
        })
    }

    fn cell(&self, row: usize, col: usize) -> String {
        self.grid.lock().unwrap()[row][col].clone()
    }

    fn updates(&self) -> Vec<(usize, BTreeMap<usize, String>)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetRpc for FakeSheet {
    async fn read(&self, _sheet: &str) -> TrackResult<Grid> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PumpTrackError::NetworkError("connection reset".to_string()));
        }
        Ok(self.grid.lock().unwrap().clone())
    }

    async fn update(
        &self,
        _sheet: &str,
        row_index: usize,
        row_data: &BTreeMap<usize, String>,
    ) -> TrackResult<()> {
        let mut grid = self.grid.lock().unwrap();
        let row = &mut grid[row_index - 1];
        for (col, value) in row_data {
            if row.len() <= *col {
                row.resize(col + 1, String::new());
            }
            row[*col] = value.clone();
        }
        self.updates
            .lock()
            .unwrap()
            .push((row_index, row_data.clone()));
        Ok(())
    }
}

const REGISTERED_AT: usize = 5;
const WORK_ORDER_NO: usize = 6;
const WORK_ORDER_AT: usize = 7;

fn beneficiary_sheet() -> Arc<FakeSheet> {
    FakeSheet::new(&[
        &["Solar Pump Beneficiaries 2026"],
        &["District: Sitapur"],
        &[
            "Sr",
            "Serial No",
            "Reg ID",
            "Beneficiary Name",
            "Village",
            "Registered At",
            "Work Order No",
            "Work Order At",
        ],
        &["1", "SN-1", "R-1", "Asha Devi", "Rampur", "", "", ""],
        &["2", "SN-2", "R-2", "Bina Kumari", "Sitapur", "2026-01-01T00:00:00Z", "", ""],
        &["3", "", "", "", "", "", "", ""],
    ])
}

fn sheet_pipeline(sheet: Arc<FakeSheet>) -> Pipeline {
    let catalog = StageCatalog::solar_pump();
    let config = TrackerConfig {
        header: HeaderDetection::default(),
        ..TrackerConfig::default()
    };
    let store = RecordStoreFactory::create_sheet(sheet, "Beneficiaries", &config, &catalog);
    Pipeline::builder(store)
        .catalog(catalog)
        .clock(FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()))
        .build()
}

#[tokio::test]
async fn test_views_are_derived_from_sheet_columns() {
    let pipeline = sheet_pipeline(beneficiary_sheet());

    let registration = pipeline.view("registration").await.unwrap();
    assert!(!registration.degraded);
    assert!(registration.is_pending("SN-1"));
    assert!(registration.is_completed("SN-2"));
    assert_eq!(registration.pending_count(), 1);
    assert_eq!(
        registration.find_pending("SN-1").unwrap().get("beneficiaryName"),
        Some("Asha Devi")
    );

    let work_order = pipeline.view("work_order").await.unwrap();
    assert!(work_order.is_pending("SN-2"));
    assert!(!work_order.is_pending("SN-1"));
}

#[tokio::test]
async fn test_completion_patches_only_changed_cells() {
    let sheet = beneficiary_sheet();
    let pipeline = sheet_pipeline(Arc::clone(&sheet));

    pipeline
        .complete("registration", "SN-1", FieldSet::new().with("village", "Rampur"))
        .await
        .unwrap();

    let updates = sheet.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, 4);
    assert_eq!(
        updates[0].1,
        BTreeMap::from([(REGISTERED_AT, "2026-03-01T10:00:00Z".to_string())])
    );

    let history = pipeline.history("registration").await.unwrap();
    assert_eq!(history[0].serial_no(), "SN-1");
    assert_eq!(history[1].serial_no(), "SN-2");
    assert!(pipeline.view("work_order").await.unwrap().is_pending("SN-1"));
}

#[tokio::test]
async fn test_second_stage_writes_its_own_columns() {
    let sheet = beneficiary_sheet();
    let pipeline = sheet_pipeline(Arc::clone(&sheet));

    let record = pipeline
        .complete("work_order", "SN-2", FieldSet::new().with("workOrderNo", "WO-7"))
        .await
        .unwrap();
    assert_eq!(record.get("regId"), Some("R-2"));

    assert_eq!(sheet.cell(4, WORK_ORDER_NO), "WO-7");
    assert_eq!(sheet.cell(4, WORK_ORDER_AT), "2026-03-01T10:00:00Z");
    assert_eq!(sheet.cell(4, REGISTERED_AT), "2026-01-01T00:00:00Z");

    let err = pipeline
        .complete("work_order", "SN-2", FieldSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PumpTrackError::NotPending { .. }));
}

#[tokio::test]
async fn test_registration_needs_an_existing_row() {
    let sheet = beneficiary_sheet();
    let pipeline = sheet_pipeline(Arc::clone(&sheet));

    let err = pipeline
        .register(FieldSet::new().with("beneficiaryName", "Esha"))
        .await
        .unwrap_err();
    assert!(err.is_persist_failure());
    assert!(sheet.updates().is_empty());
}

#[tokio::test]
async fn test_read_failures_degrade_views_and_abort_writes() {
    let sheet = beneficiary_sheet();
    let pipeline = sheet_pipeline(Arc::clone(&sheet));
    sheet.fail_reads.store(true, Ordering::SeqCst);

    let view = pipeline.view("registration").await.unwrap();
    assert!(view.degraded);
    assert!(view.pending.is_empty());

    let err = pipeline
        .complete("registration", "SN-1", FieldSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PumpTrackError::LoadFailed { .. }));
    assert!(sheet.updates().is_empty());
}

#[tokio::test]
async fn test_header_fallback_without_anchors() {
    // No anchor headers anywhere: the fixed fallback row is used
    let sheet = FakeSheet::new(&[
        &["a"],
        &["b"],
        &["c"],
        &["d"],
        &["e"],
        &["Serial No", "Name", "Registered At"],
        &["SN-1", "Asha", ""],
    ]);
    let pipeline = sheet_pipeline(sheet);

    let view = pipeline.view("registration").await.unwrap();
    assert!(view.is_pending("SN-1"));
}

#[tokio::test]
async fn test_date_column_before_completion_column() {
    // "Work Order Date" contains "at" and sits left of "Work Order At"
    let sheet = FakeSheet::new(&[
        &[
            "Serial No",
            "Reg ID",
            "Beneficiary Name",
            "Village",
            "Registered At",
            "Work Order No",
            "Work Order Date",
            "Work Order At",
        ],
        &["SN-1", "R-1", "Asha Devi", "Rampur", "2026-01-01T00:00:00Z", "", "", ""],
    ]);
    let pipeline = sheet_pipeline(Arc::clone(&sheet));
    assert!(pipeline.view("work_order").await.unwrap().is_pending("SN-1"));

    pipeline
        .complete(
            "work_order",
            "SN-1",
            FieldSet::new()
                .with("workOrderNo", "WO-7")
                .with("workOrderDate", "2026-02-02"),
        )
        .await
        .unwrap();

    let updates = sheet.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, 2);
    assert_eq!(
        updates[0].1,
        BTreeMap::from([
            (5, "WO-7".to_string()),
            (6, "2026-02-02".to_string()),
            (7, "2026-03-01T10:00:00Z".to_string()),
        ])
    );
    assert_eq!(sheet.cell(1, 6), "2026-02-02");
    assert_eq!(sheet.cell(1, 7), "2026-03-01T10:00:00Z");
    assert!(!pipeline.view("work_order").await.unwrap().is_pending("SN-1"));
}
