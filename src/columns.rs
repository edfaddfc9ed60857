//! Header row detection and column resolution for spreadsheet grids
//!
//! Sheets exported from the field offices do not keep their header at a fixed
//! row: title blocks and merged banner rows push it down. The resolver scans
//! the top of the grid for a row that looks like a header, then maps each
//! logical field to a header cell. A cell spelling exactly the field's
//! keywords wins; otherwise the first cell containing all of them is used.
//! No two fields share a column.

use crate::app_log;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows scanned when looking for the header
pub const DEFAULT_SEARCH_DEPTH: usize = 10;

/// Row used when no header is detected (sixth row of the standard template)
pub const DEFAULT_FALLBACK_ROW: usize = 5;

/// Anchor matches needed for a row to count as the header
pub const DEFAULT_ANCHOR_THRESHOLD: usize = 2;

/// Anchors of the standard beneficiary template, already normalized
pub const DEFAULT_ANCHORS: [&str; 3] = ["regid", "beneficiaryname", "village"];

/// Lowercase and remove all whitespace
pub fn normalize(cell: &str) -> String {
    cell.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// How the header row was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderStrategy {
    /// A row within the search depth matched enough anchors
    Detected,
    /// No row matched; the template's fixed row was used
    FallbackRow,
    /// Neither matched nor long enough for the fixed row; row 0 was used
    FirstRow,
}

/// Location of the header row within a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    pub row: usize,
    pub strategy: HeaderStrategy,
}

/// Header detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDetection {
    pub search_depth: usize,
    pub fallback_row: usize,
    pub anchor_threshold: usize,
    pub anchors: Vec<String>,
}

impl Default for HeaderDetection {
    fn default() -> Self {
        Self {
            search_depth: DEFAULT_SEARCH_DEPTH,
            fallback_row: DEFAULT_FALLBACK_ROW,
            anchor_threshold: DEFAULT_ANCHOR_THRESHOLD,
            anchors: DEFAULT_ANCHORS.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Resolved logical-field-to-column mapping
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMap {
    header_row: Option<usize>,
    columns: BTreeMap<String, Option<usize>>,
}

impl ColumnMap {
    /// Header row index, `None` for an empty grid
    pub fn header_row(&self) -> Option<usize> {
        self.header_row
    }

    /// Column of a field; `None` when the field is absent
    pub fn index(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied().flatten()
    }

    /// Whether the field resolved to a column
    pub fn is_resolved(&self, field: &str) -> bool {
        self.index(field).is_some()
    }

    /// Fields that did not resolve
    pub fn missing(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Resolved `(field, column)` pairs
    pub fn resolved(&self) -> impl Iterator<Item = (&str, usize)> {
        self.columns
            .iter()
            .filter_map(|(name, idx)| idx.map(|i| (name.as_str(), i)))
    }

    /// Read a field from a row; absent fields and short rows read as ""
    pub fn read<'a>(&self, row: &'a [String], field: &str) -> &'a str {
        self.index(field)
            .and_then(|idx| row.get(idx))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Write a field into a `{column: value}` patch; absent fields are skipped.
    ///
    /// Returns whether the write happened.
    pub fn write(&self, patch: &mut BTreeMap<usize, String>, field: &str, value: &str) -> bool {
        match self.index(field) {
            Some(idx) => {
                patch.insert(idx, value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Maps semi-structured header rows onto logical field names
#[derive(Debug, Clone, Default)]
pub struct ColumnResolver {
    detection: HeaderDetection,
    /// Registration order decides which field keeps a contested column
    keyword_sets: Vec<(String, Vec<String>)>,
}

impl ColumnResolver {
    pub fn new(detection: HeaderDetection) -> Self {
        Self {
            detection: HeaderDetection {
                anchors: detection.anchors.iter().map(|a| normalize(a)).collect(),
                ..detection
            },
            keyword_sets: Vec::new(),
        }
    }

    /// Register a logical field and the keywords its header must contain
    pub fn field<I, S>(mut self, name: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let keywords: Vec<String> = keywords.into_iter().map(|k| normalize(k.as_ref())).collect();
        match self.keyword_sets.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = keywords,
            None => self.keyword_sets.push((name, keywords)),
        }
        self
    }

    pub fn detection(&self) -> &HeaderDetection {
        &self.detection
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keyword_sets.iter().map(|(name, _)| name.as_str())
    }

    /// Find the header row; `None` only for an empty grid
    pub fn locate_header(&self, rows: &[Vec<String>]) -> Option<HeaderLocation> {
        if rows.is_empty() {
            return None;
        }

        let depth = self.detection.search_depth.min(rows.len());
        for (idx, row) in rows.iter().take(depth).enumerate() {
            let cells: Vec<String> = row.iter().map(|c| normalize(c)).collect();
            let matches = self
                .detection
                .anchors
                .iter()
                .filter(|anchor| cells.iter().any(|c| c == *anchor))
                .count();
            if matches >= self.detection.anchor_threshold {
                return Some(HeaderLocation {
                    row: idx,
                    strategy: HeaderStrategy::Detected,
                });
            }
        }

        if self.detection.fallback_row < rows.len() {
            app_log!(
                LogLevel::Warn,
                "columns",
                "No header row detected in first {} rows, using fallback row {}",
                depth,
                self.detection.fallback_row
            );
            Some(HeaderLocation {
                row: self.detection.fallback_row,
                strategy: HeaderStrategy::FallbackRow,
            })
        } else {
            app_log!(
                LogLevel::Warn,
                "columns",
                "No header row detected and grid has {} rows, using row 0",
                rows.len()
            );
            Some(HeaderLocation {
                row: 0,
                strategy: HeaderStrategy::FirstRow,
            })
        }
    }

    /// Resolve every registered field against a single header row.
    ///
    /// Exact matches (`workorderat` for `work`+`order`+`at`) are claimed
    /// before containment matches. A field whose match is a column another
    /// field already holds stays unresolved.
    pub fn resolve_header(&self, header: &[String]) -> BTreeMap<String, Option<usize>> {
        let cells: Vec<String> = header.iter().map(|c| normalize(c)).collect();
        let mut columns: BTreeMap<String, Option<usize>> = self
            .keyword_sets
            .iter()
            .map(|(name, _)| (name.clone(), None))
            .collect();
        let mut claimed: BTreeMap<usize, &str> = BTreeMap::new();
        let mut contested: Vec<&str> = Vec::new();

        for exact_pass in [true, false] {
            for (name, keywords) in &self.keyword_sets {
                let name = name.as_str();
                if keywords.is_empty()
                    || contested.contains(&name)
                    || columns.get(name).copied().flatten().is_some()
                {
                    continue;
                }

                let found = if exact_pass {
                    let joined = keywords.concat();
                    cells.iter().position(|cell| *cell == joined)
                } else {
                    cells
                        .iter()
                        .position(|cell| keywords.iter().all(|k| cell.contains(k.as_str())))
                };
                let Some(idx) = found else {
                    continue;
                };

                if let Some(holder) = claimed.get(&idx) {
                    app_log!(
                        LogLevel::Warn,
                        "columns",
                        "Column {} ('{}') already holds '{}'; '{}' left unresolved",
                        idx,
                        header[idx],
                        holder,
                        name
                    );
                    contested.push(name);
                } else {
                    claimed.insert(idx, name);
                    columns.insert(name.to_string(), Some(idx));
                }
            }
        }
        columns
    }

    /// Locate the header and resolve all fields.
    ///
    /// An empty grid yields an empty map; every lookup then reads as absent.
    pub fn resolve(&self, rows: &[Vec<String>]) -> ColumnMap {
        let Some(location) = self.locate_header(rows) else {
            return ColumnMap::default();
        };

        let columns = self.resolve_header(&rows[location.row]);
        let map = ColumnMap {
            header_row: Some(location.row),
            columns,
        };

        let missing = map.missing();
        if !missing.is_empty() {
            app_log!(
                LogLevel::Debug,
                "columns",
                "Unresolved columns at header row {}: {}",
                location.row,
                missing.join(", ")
            );
        }
        map
    }
}
