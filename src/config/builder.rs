use super::{SerialConfig, SerialScheme, StoreBackend, TrackerConfig, DEFAULT_SHEET_NAME, DEFAULT_TIMEOUT_SECS};
use crate::columns::HeaderDetection;
use crate::error::{PumpTrackError, TrackResult};
use crate::repository::RetryPolicy;
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

/// Check that a sheet endpoint is an absolute http(s) URL
pub(crate) fn validate_endpoint(endpoint: &str) -> TrackResult<()> {
    let url = Url::parse(endpoint).map_err(|e| {
        PumpTrackError::ConfigError(format!("invalid sheet endpoint '{}': {}", endpoint, e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PumpTrackError::ConfigError(format!(
            "sheet endpoint must be http(s), got '{}'",
            other
        ))),
    }
}

/// Builder for constructing TrackerConfig instances with a fluent API
///
/// # Example
/// ```
/// use pumptrack_lib::config::TrackerConfigBuilder;
///
/// let config = TrackerConfigBuilder::new()
///     .remote_sheet("https://script.example.com/exec", "dataset-1")
///     .sheet_name("Beneficiaries")
///     .timeout_secs(15)
///     .build()
///     .unwrap();
/// assert!(config.store.is_remote());
/// ```
#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    local_path: Option<PathBuf>,
    key_prefix: String,
    endpoint: Option<String>,
    dataset_id: Option<String>,
    sheet_name: Option<String>,
    timeout_secs: Option<u64>,
    retry: Option<RetryPolicy>,
    header: Option<HeaderDetection>,
    column_keywords: BTreeMap<String, Vec<String>>,
    serials: SerialConfig,
}

impl TrackerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store records in a local JSON file
    pub fn local(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Store records in a remote sheet
    pub fn remote_sheet(mut self, endpoint: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = Some(name.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn header(mut self, header: HeaderDetection) -> Self {
        self.header = Some(header);
        self
    }

    /// Override the header keywords for one field
    pub fn column_keywords<I, S>(mut self, field: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_keywords
            .insert(field.into(), keywords.into_iter().map(Into::into).collect());
        self
    }

    pub fn sequential_serials(mut self, prefix: impl Into<String>, width: usize) -> Self {
        self.serials = SerialConfig {
            scheme: SerialScheme::Sequential,
            prefix: prefix.into(),
            width,
        };
        self
    }

    pub fn uuid_serials(mut self) -> Self {
        self.serials.scheme = SerialScheme::Uuid;
        self
    }

    /// Build the TrackerConfig instance
    ///
    /// # Errors
    /// Returns `PumpTrackError::BuilderError` if both backends are chosen or a
    /// remote setting is invalid
    pub fn build(self) -> TrackResult<TrackerConfig> {
        let store = match (self.local_path, self.endpoint) {
            (Some(_), Some(_)) => {
                return Err(PumpTrackError::BuilderError(
                    "choose either a local store or a remote sheet, not both".to_string(),
                ))
            }
            (Some(path), None) => StoreBackend::Local {
                path,
                key_prefix: self.key_prefix,
            },
            (None, Some(endpoint)) => {
                validate_endpoint(&endpoint)
                    .map_err(|e| PumpTrackError::BuilderError(e.to_string()))?;

                let dataset_id = self.dataset_id.unwrap_or_default();
                if dataset_id.trim().is_empty() {
                    return Err(PumpTrackError::BuilderError(
                        "dataset id is required for a remote sheet".to_string(),
                    ));
                }
                let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
                if timeout_secs == 0 {
                    return Err(PumpTrackError::BuilderError(
                        "timeout must be at least one second".to_string(),
                    ));
                }
                StoreBackend::RemoteSheet {
                    endpoint,
                    dataset_id,
                    sheet_name: self
                        .sheet_name
                        .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
                    timeout_secs,
                    retry: self.retry.unwrap_or_default(),
                }
            }
            (None, None) => match StoreBackend::default() {
                StoreBackend::Local { path, .. } => StoreBackend::Local {
                    path,
                    key_prefix: self.key_prefix,
                },
                remote => remote,
            },
        };

        let header = self.header.unwrap_or_default();
        if header.anchor_threshold == 0 {
            return Err(PumpTrackError::BuilderError(
                "anchor threshold must be at least 1".to_string(),
            ));
        }

        if self.serials.scheme == SerialScheme::Sequential && self.serials.width == 0 {
            return Err(PumpTrackError::BuilderError(
                "serial width must be at least 1".to_string(),
            ));
        }

        Ok(TrackerConfig {
            store,
            header,
            column_keywords: self.column_keywords,
            serials: self.serials,
        })
    }
}
