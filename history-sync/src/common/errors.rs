//! Custom Errors and Types
//!
//! Row-level errors (transport, schema, write) are counted by the orchestrator and
//! never abort a run. Validation, source-store and checkpoint errors do.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Setup-time problems detected before any I/O against the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a valid time window must be configured (start and end)")]
    MissingTimeWindow,
    #[error("window start {start} must be earlier than window end {end}")]
    InvertedTimeWindow { start: i64, end: i64 },
    #[error("identifier list must not be empty")]
    EmptyIdentifierList,
    #[error("could not parse '{0}' as a point in time")]
    InvalidTimestamp(String),
    #[error("column '{0}' was not found in the source table")]
    MissingSourceField(String),
    #[error("invalid history endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
}

/// Failures talking to the history provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network request failed: {0}")]
    Network(String),
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("unexpected payload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout;
        }
        if err.is_decode() {
            return TransportError::MalformedPayload(err.to_string());
        }
        TransportError::Network(err.to_string())
    }
}

/// Error reported by a table store for any single capability call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct StoreError {
    pub operation: &'static str,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Target field provisioning failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("could not create field '{name}': {source}")]
    FieldCreationFailed { name: String, source: StoreError },
    #[error("fields still missing after provisioning, check table permissions: {}", .0.join(", "))]
    UnresolvedFields(Vec<String>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single sample could not be written. Collected, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("creating row for {timestamp} failed: {source}")]
    CreateFailed { timestamp: i64, source: StoreError },
    #[error("updating row {row_id} for {timestamp} failed: {source}")]
    UpdateFailed {
        timestamp: i64,
        row_id: String,
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("there is no saved or paused progress to resume")]
    NothingToResume,
    #[error("could not connect the new target table: {0}")]
    Reconnect(SchemaError),
}

/// The settings file could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}
