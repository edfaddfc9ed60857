use thiserror::Error;

/// Central error type for the pumptrack library
#[derive(Error, Debug)]
pub enum PumpTrackError {
    // ============================================================================
    // Pipeline Errors
    // ============================================================================
    #[error("Unknown stage: {0}")]
    StageNotFound(String),

    #[error("Serial number {serial_no} is not pending at stage '{stage}'")]
    NotPending { stage: String, serial_no: String },

    #[error("Serial number {serial_no} already exists in '{collection}'")]
    DuplicateSerial {
        collection: String,
        serial_no: String,
    },

    #[error("Invalid fields: {0}")]
    InvalidFields(String),

    #[error("Invalid stage catalog: {0}")]
    InvalidCatalog(String),

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Failed to load collection '{collection}': {reason}")]
    LoadFailed { collection: String, reason: String },

    #[error("Failed to persist collection '{collection}': {reason}")]
    PersistFailed { collection: String, reason: String },

    // ============================================================================
    // Sheet Errors
    // ============================================================================
    #[error("Header row could not be located in sheet '{0}'")]
    HeaderNotFound(String),

    #[error("Serial number {0} has no row in the sheet")]
    SerialNotInSheet(String),

    #[error("Remote sheet rejected the request: {0}")]
    RemoteRejected(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Builder pattern validation error
    #[error("Builder error: {0}")]
    BuilderError(String),
}

impl PumpTrackError {
    /// True when a completion was rejected because the serial is not pending
    pub fn is_not_found(&self) -> bool {
        matches!(self, PumpTrackError::NotPending { .. })
    }

    /// True when a write did not reach the store
    pub fn is_persist_failure(&self) -> bool {
        matches!(self, PumpTrackError::PersistFailed { .. })
    }
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for PumpTrackError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        PumpTrackError::LockError
    }
}

impl From<reqwest::Error> for PumpTrackError {
    fn from(err: reqwest::Error) -> Self {
        PumpTrackError::NetworkError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PumpTrackError {
    fn from(err: tokio::task::JoinError) -> Self {
        PumpTrackError::TaskFailed(err.to_string())
    }
}

// Conversion to String for command/UI boundaries
impl From<PumpTrackError> for String {
    fn from(error: PumpTrackError) -> Self {
        error.to_string()
    }
}

// Helper type alias for Results
pub type TrackResult<T> = Result<T, PumpTrackError>;
