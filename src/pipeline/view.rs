use crate::record::Record;
use serde::Serialize;
use std::collections::HashSet;

/// Records from `upstream` whose serial is not yet in `history`, in upstream order
pub fn derive_pending(upstream: &[Record], history: &[Record]) -> Vec<Record> {
    let done: HashSet<&str> = history.iter().map(|r| r.serial_no()).collect();
    let mut seen = HashSet::new();
    upstream
        .iter()
        .filter(|r| !done.contains(r.serial_no()) && seen.insert(r.serial_no()))
        .cloned()
        .collect()
}

/// Pending and history snapshot of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    /// Stage name
    pub stage: String,

    /// Records waiting for this stage, in upstream order
    pub pending: Vec<Record>,

    /// Records completed at this stage, most recent first
    pub history: Vec<Record>,

    /// True when a collection failed to load and was treated as empty
    pub degraded: bool,
}

impl StageView {
    pub fn is_pending(&self, serial_no: &str) -> bool {
        self.pending.iter().any(|r| r.serial_no() == serial_no)
    }

    pub fn is_completed(&self, serial_no: &str) -> bool {
        self.history.iter().any(|r| r.serial_no() == serial_no)
    }

    pub fn find_pending(&self, serial_no: &str) -> Option<&Record> {
        self.pending.iter().find(|r| r.serial_no() == serial_no)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn completed_count(&self) -> usize {
        self.history.len()
    }
}

/// Counts for one stage on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub label: String,
    pub pending: usize,
    pub completed: usize,
}

/// Counts for every stage, in catalog order
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub stages: Vec<StageSummary>,
}

impl PipelineSummary {
    pub fn get(&self, stage: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Total pending work across all stages
    pub fn total_pending(&self) -> usize {
        self.stages.iter().map(|s| s.pending).sum()
    }

    /// Beneficiaries that finished the last stage
    pub fn fully_completed(&self) -> usize {
        self.stages.last().map(|s| s.completed).unwrap_or(0)
    }
}

/// Where one serial number stands in the chain
#[derive(Debug, Clone, Serialize)]
pub struct RecordTrace {
    pub serial_no: String,

    /// Stages completed, in catalog order
    pub completed_stages: Vec<String>,

    /// Stage the serial is waiting in, if any
    pub pending_stage: Option<String>,

    /// Most enriched copy of the record
    pub latest: Option<Record>,
}

impl RecordTrace {
    pub fn is_known(&self) -> bool {
        self.latest.is_some()
    }
}
