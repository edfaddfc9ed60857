//! Tracker configuration
//!
//! Stored as a JSON document; any field left out takes its default. A few
//! environment variables override the file so deployments can point the same
//! config at a different store without editing it.

pub mod builder;

pub use builder::TrackerConfigBuilder;

use crate::columns::HeaderDetection;
use crate::error::{PumpTrackError, TrackResult};
use crate::pipeline::{SequentialSerials, SerialGenerator, UuidSerials};
use crate::repository::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ENV_STORE_PATH: &str = "PUMPTRACK_STORE_PATH";
pub const ENV_SHEET_ENDPOINT: &str = "PUMPTRACK_SHEET_ENDPOINT";
pub const ENV_DATASET_ID: &str = "PUMPTRACK_DATASET_ID";

pub const DEFAULT_STORE_PATH: &str = "pumptrack-store.json";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where records live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackend {
    /// JSON file on this machine
    Local {
        path: PathBuf,
        #[serde(default)]
        key_prefix: String,
    },

    /// Shared spreadsheet behind a web app endpoint
    RemoteSheet {
        endpoint: String,
        dataset_id: String,
        #[serde(default = "default_sheet_name")]
        sheet_name: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default)]
        retry: RetryPolicy,
    },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Local {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            key_prefix: String::new(),
        }
    }
}

impl StoreBackend {
    pub fn is_remote(&self) -> bool {
        matches!(self, StoreBackend::RemoteSheet { .. })
    }
}

fn default_sheet_name() -> String {
    DEFAULT_SHEET_NAME.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// How new registrations get their serial numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialScheme {
    Sequential,
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub scheme: SerialScheme,
    pub prefix: String,
    pub width: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            scheme: SerialScheme::Sequential,
            prefix: "SN-".to_string(),
            width: 4,
        }
    }
}

impl SerialConfig {
    pub fn generator(&self) -> Arc<dyn SerialGenerator> {
        match self.scheme {
            SerialScheme::Sequential => {
                Arc::new(SequentialSerials::new(self.prefix.clone(), self.width))
            }
            SerialScheme::Uuid => Arc::new(UuidSerials),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub store: StoreBackend,

    /// Header row detection for sheet-backed stores
    pub header: HeaderDetection,

    /// Header keywords per field, replacing the ones derived from the field name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub column_keywords: BTreeMap<String, Vec<String>>,

    pub serials: SerialConfig,
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::new()
    }

    /// Read a config file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> TrackResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            PumpTrackError::ConfigError(format!("{}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> TrackResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> TrackResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable lookup.
    ///
    /// The sheet endpoint switches the store to the remote backend; it then
    /// needs a dataset id from the lookup or the existing config.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> TrackResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get(ENV_SHEET_ENDPOINT) {
            let current_id = match &self.store {
                StoreBackend::RemoteSheet { dataset_id, .. } => Some(dataset_id.clone()),
                StoreBackend::Local { .. } => None,
            };
            let dataset_id = get(ENV_DATASET_ID).or(current_id).ok_or_else(|| {
                PumpTrackError::ConfigError(format!(
                    "{} is set but no dataset id is configured ({})",
                    ENV_SHEET_ENDPOINT, ENV_DATASET_ID
                ))
            })?;
            builder::validate_endpoint(&endpoint)?;

            self.store = match std::mem::take(&mut self.store) {
                StoreBackend::RemoteSheet {
                    sheet_name,
                    timeout_secs,
                    retry,
                    ..
                } => StoreBackend::RemoteSheet {
                    endpoint,
                    dataset_id,
                    sheet_name,
                    timeout_secs,
                    retry,
                },
                StoreBackend::Local { .. } => StoreBackend::RemoteSheet {
                    endpoint,
                    dataset_id,
                    sheet_name: default_sheet_name(),
                    timeout_secs: DEFAULT_TIMEOUT_SECS,
                    retry: RetryPolicy::default(),
                },
            };
        } else if let Some(id) = get(ENV_DATASET_ID) {
            if let StoreBackend::RemoteSheet { dataset_id, .. } = &mut self.store {
                *dataset_id = id;
            }
        }

        if let Some(store_path) = get(ENV_STORE_PATH) {
            if let StoreBackend::Local { path, .. } = &mut self.store {
                *path = PathBuf::from(store_path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_local() {
        let config = TrackerConfig::default();
        assert!(!config.store.is_remote());
        assert_eq!(config.header.search_depth, 10);
        assert_eq!(config.serials.prefix, "SN-");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrackerConfig::load(temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("tracker.json");

        let mut config = TrackerConfig::default();
        config.store = StoreBackend::RemoteSheet {
            endpoint: "https://script.example.com/exec".to_string(),
            dataset_id: "abc123".to_string(),
            sheet_name: "Beneficiaries".to_string(),
            timeout_secs: 10,
            retry: RetryPolicy::default(),
        };
        config
            .column_keywords
            .insert("regId".to_string(), vec!["reg".to_string(), "no".to_string()]);
        config.save(&path).unwrap();

        assert_eq!(TrackerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tracker.json");
        fs::write(
            &path,
            r#"{"store": {"type": "remote_sheet", "endpoint": "https://x.example/exec", "dataset_id": "d1"}}"#,
        )
        .unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        match config.store {
            StoreBackend::RemoteSheet {
                sheet_name,
                timeout_secs,
                retry,
                ..
            } => {
                assert_eq!(sheet_name, DEFAULT_SHEET_NAME);
                assert_eq!(timeout_secs, DEFAULT_TIMEOUT_SECS);
                assert_eq!(retry.max_attempts, 4);
            }
            other => panic!("expected remote store, got {:?}", other),
        }
        assert_eq!(config.serials, SerialConfig::default());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tracker.json");
        fs::write(&path, "{ store: ").unwrap();
        assert!(matches!(
            TrackerConfig::load(&path).unwrap_err(),
            PumpTrackError::ConfigError(_)
        ));
    }

    #[test]
    fn test_store_path_override() {
        let mut config = TrackerConfig::default();
        config
            .apply_overrides(env(&[(ENV_STORE_PATH, "/var/lib/pumptrack/store.json")]))
            .unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Local {
                path: PathBuf::from("/var/lib/pumptrack/store.json"),
                key_prefix: String::new(),
            }
        );
    }

    #[test]
    fn test_endpoint_override_switches_to_remote() {
        let mut config = TrackerConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_SHEET_ENDPOINT, "https://script.example.com/exec"),
                (ENV_DATASET_ID, "sheet-42"),
                (ENV_STORE_PATH, "ignored.json"),
            ]))
            .unwrap();

        match &config.store {
            StoreBackend::RemoteSheet {
                endpoint,
                dataset_id,
                ..
            } => {
                assert_eq!(endpoint, "https://script.example.com/exec");
                assert_eq!(dataset_id, "sheet-42");
            }
            other => panic!("expected remote store, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_override_needs_dataset_id() {
        let mut config = TrackerConfig::default();
        let result =
            config.apply_overrides(env(&[(ENV_SHEET_ENDPOINT, "https://script.example.com/exec")]));
        assert!(matches!(result, Err(PumpTrackError::ConfigError(_))));
        assert!(!config.store.is_remote());
    }

    #[test]
    fn test_endpoint_override_rejects_bad_url() {
        let mut config = TrackerConfig::default();
        let result = config.apply_overrides(env(&[
            (ENV_SHEET_ENDPOINT, "not a url"),
            (ENV_DATASET_ID, "d1"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_uuid_serial_scheme() {
        let serials = SerialConfig {
            scheme: SerialScheme::Uuid,
            ..SerialConfig::default()
        };
        let serial = serials.generator().next_serial(&[]);
        assert!(uuid::Uuid::parse_str(&serial).is_ok());
    }
}
