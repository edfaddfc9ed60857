//! Beneficiary records and form field payloads
//!
//! A [`Record`] is a flat mapping from field name to an optional string value.
//! Every record carries a `serialNo` that identifies one beneficiary across all
//! stages. Records are values: stages never mutate a stored record, they write
//! a new, larger one.

use crate::error::{PumpTrackError, TrackResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field that identifies a beneficiary end to end
pub const SERIAL_NO_FIELD: &str = "serialNo";

/// One beneficiary record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Map<String, Value>",
    into = "BTreeMap<String, Option<String>>"
)]
pub struct Record {
    fields: BTreeMap<String, Option<String>>,
}

impl Record {
    /// Create a record holding only its serial number
    pub fn new(serial_no: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(SERIAL_NO_FIELD.to_string(), Some(serial_no.into()));
        Self { fields }
    }

    /// Build a record from a serial number and a field payload
    pub fn with_fields(serial_no: impl Into<String>, fields: &FieldSet) -> Self {
        let mut record = Self::new(serial_no);
        for (name, value) in fields.iter() {
            if name != SERIAL_NO_FIELD {
                record.fields.insert(name.clone(), value.clone());
            }
        }
        record
    }

    /// The serial number
    pub fn serial_no(&self) -> &str {
        self.fields
            .get(SERIAL_NO_FIELD)
            .and_then(|v| v.as_deref())
            .unwrap_or_default()
    }

    /// Get a field value; `None` for missing or null fields
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }

    /// Field value or the empty string
    pub fn get_or_empty(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    /// Whether the field holds a non-blank value
    pub fn is_filled(&self, field: &str) -> bool {
        self.get(field).is_some_and(|v| !v.trim().is_empty())
    }

    /// Whether the field is present at all (even if null)
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// All field names, sorted
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Number of fields including `serialNo`
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(field, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Produce the record a stage writes to its history.
    ///
    /// The result holds every field of `self`, overlaid with `fields`, plus
    /// `completion_field` set to `timestamp`. `self` is left untouched.
    pub fn merged(&self, fields: &FieldSet, completion_field: &str, timestamp: &str) -> Record {
        let mut next = self.clone();
        for (name, value) in fields.iter() {
            if name != SERIAL_NO_FIELD {
                next.fields.insert(name.clone(), value.clone());
            }
        }
        next.fields
            .insert(completion_field.to_string(), Some(timestamp.to_string()));
        next
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = PumpTrackError;

    fn try_from(map: Map<String, Value>) -> TrackResult<Self> {
        let mut fields = BTreeMap::new();
        for (name, value) in map {
            fields.insert(name, scalar_to_string(value));
        }

        let record = Record { fields };
        if record.serial_no().trim().is_empty() {
            return Err(PumpTrackError::InvalidFields(
                "record is missing serialNo".to_string(),
            ));
        }
        Ok(record)
    }
}

impl From<Record> for BTreeMap<String, Option<String>> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

/// Stringify a JSON cell the way the sheet displays it
pub(crate) fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Fields submitted from a stage form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet {
    values: BTreeMap<String, Option<String>>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string value (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a string value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), Some(value.into()));
    }

    /// Set an explicit null
    pub fn set_null(&mut self, name: impl Into<String>) {
        self.values.insert(name.into(), None);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Option<String>> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<String>)> {
        self.values.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for FieldSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = FieldSet::new();
        for (k, v) in iter {
            fields.set(k, v);
        }
        fields
    }
}
