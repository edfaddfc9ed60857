//! Client for the spreadsheet read/update RPC
//!
//! The service answers `GET ?action=read` with either a bare 2-D array or
//! `{"data": [...]}`, and `POST action=update` with `{"status": "success"}` or
//! some error shape. Response bodies are not reliably JSON, so both are parsed
//! defensively.

use crate::app_log;
use crate::error::{PumpTrackError, TrackResult};
use crate::record::scalar_to_string;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A sheet as rows of cell strings
pub type Grid = Vec<Vec<String>>;

/// Read-all-rows / update-one-row access to a remote sheet
#[async_trait]
pub trait SheetRpc: Send + Sync {
    /// Read every row of a sheet
    async fn read(&self, sheet: &str) -> TrackResult<Grid>;

    /// Overwrite selected cells of one row; `row_index` is 1-based
    async fn update(
        &self,
        sheet: &str,
        row_index: usize,
        row_data: &BTreeMap<usize, String>,
    ) -> TrackResult<()>;
}

/// Retry settings for sheet reads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff before the next attempt
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(attempt as u64))
    }
}

/// HTTP client for a spreadsheet web app endpoint
pub struct HttpSheetRpc {
    client: reqwest::Client,
    endpoint: String,
    dataset_id: String,
    retry: RetryPolicy,
}

impl HttpSheetRpc {
    pub fn new(
        endpoint: impl Into<String>,
        dataset_id: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> TrackResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            dataset_id: dataset_id.into(),
            retry,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn read_once(&self, sheet: &str) -> TrackResult<String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "read"),
                ("sheet", sheet),
                ("sheetName", sheet),
                ("id", self.dataset_id.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PumpTrackError::NetworkError(format!(
                "read of '{}' failed with status {}",
                sheet, status
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl SheetRpc for HttpSheetRpc {
    async fn read(&self, sheet: &str) -> TrackResult<Grid> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.read_once(sheet).await {
                Ok(body) => return parse_read_response(&body),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    app_log!(
                        LogLevel::Warn,
                        "store::sheet",
                        "Read of '{}' failed (attempt {}/{}): {}",
                        sheet,
                        attempt,
                        attempts,
                        e
                    );
                }
            }
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }

    async fn update(
        &self,
        sheet: &str,
        row_index: usize,
        row_data: &BTreeMap<usize, String>,
    ) -> TrackResult<()> {
        let row_json = serde_json::to_string(row_data)?;
        let row_index = row_index.to_string();

        // Updates are not retried: a timed-out request may still have landed.
        let resp = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("action", "update"),
                ("sheetName", sheet),
                ("id", self.dataset_id.as_str()),
                ("rowIndex", row_index.as_str()),
                ("rowData", row_json.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PumpTrackError::NetworkError(format!(
                "update of '{}' row {} failed with status {}",
                sheet, row_index, status
            )));
        }
        parse_update_response(&body)
    }
}

/// Turn a read response into a grid
pub fn parse_read_response(body: &str) -> TrackResult<Grid> {
    let value: Value = serde_json::from_str(body.trim()).map_err(|_| {
        PumpTrackError::RemoteRejected(format!("read returned non-JSON body: {}", snippet(body)))
    })?;

    match value {
        Value::Array(rows) => Ok(rows_to_grid(rows)),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(rows)) => Ok(rows_to_grid(rows)),
            _ => Err(PumpTrackError::RemoteRejected(
                error_message(&Value::Object(obj))
                    .unwrap_or_else(|| "read response has no data array".to_string()),
            )),
        },
        _ => Err(PumpTrackError::RemoteRejected(
            "unexpected read response shape".to_string(),
        )),
    }
}

/// Interpret an update response body
pub fn parse_update_response(body: &str) -> TrackResult<()> {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(value) => {
            let status = value.get("status").and_then(Value::as_str);
            let success_flag = value.get("success").and_then(Value::as_bool);
            if status.is_some_and(|s| s.eq_ignore_ascii_case("success")) || success_flag == Some(true)
            {
                Ok(())
            } else {
                Err(PumpTrackError::RemoteRejected(
                    error_message(&value).unwrap_or_else(|| snippet(body)),
                ))
            }
        }
        // Last resort for HTML or plain-text replies
        Err(_) if body.to_ascii_lowercase().contains("success") => Ok(()),
        Err(_) => Err(PumpTrackError::RemoteRejected(snippet(body))),
    }
}

fn rows_to_grid(rows: Vec<Value>) -> Grid {
    rows.into_iter()
        .map(|row| match row {
            Value::Array(cells) => cells
                .into_iter()
                .map(|c| scalar_to_string(c).unwrap_or_default())
                .collect(),
            Value::Null => Vec::new(),
            other => vec![scalar_to_string(other).unwrap_or_default()],
        })
        .collect()
}

fn error_message(value: &Value) -> Option<String> {
    ["message", "error", "status"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else {
        trimmed.to_string()
    }
}
