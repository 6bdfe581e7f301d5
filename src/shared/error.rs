//! Shared Error Types
//!
//! Errors raised by the local stores, the sync engine and the configuration layer.
//!
//! # Error Categories
//!
//! - `SyncError::Storage` - the local SQLite store failed (unavailable, corrupt, schema mismatch)
//! - `SyncError::Serialization` - a payload could not be encoded or decoded
//! - `SyncError::MissingRecordId` / `SyncError::UnknownTable` - caller supplied bad input
//! - `RemoteError` - the remote backend rejected or never received a mutation
//!
//! Local persistence errors are propagated to the caller untouched; the sync engine
//! never retries them. Remote errors are always treated as retryable.
//!
//! # Usage
//!
//! ```rust
//! use roofsync::shared::error::SyncError;
//!
//! let error = SyncError::missing_record_id("inspections");
//! assert!(error.to_string().contains("inspections"));
//! ```

use thiserror::Error;

use crate::shared::config::ConfigError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors produced by local persistence and sync bookkeeping
#[derive(Debug, Error)]
pub enum SyncError {
    /// The embedded database failed
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// JSON serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A payload was enqueued without an `id` field
    #[error("Payload for table '{table}' has no record id")]
    MissingRecordId {
        /// Table the payload was addressed to
        table: String,
    },

    /// The table does not hold locally tracked records
    #[error("Unknown record table: {0}")]
    UnknownTable(String),

    /// A persisted row could not be interpreted
    #[error("Corrupt row in '{table}': {message}")]
    CorruptRow {
        /// Table holding the row
        table: &'static str,
        /// Human-readable error message
        message: String,
    },

    /// Every candidate queue id for this enqueue was already taken
    #[error("Could not allocate a queue id for {0}")]
    QueueIdExhausted(String),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem error while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Create a new missing record id error
    pub fn missing_record_id(table: impl Into<String>) -> Self {
        Self::MissingRecordId {
            table: table.into(),
        }
    }

    /// Create a new corrupt row error
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRow {
            table,
            message: message.into(),
        }
    }
}

/// Failure reported by a remote backend call
///
/// The engine does not distinguish between the variants when deciding to retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with an error
    #[error("Backend error ({status}): {message}")]
    Backend {
        /// HTTP status code (or backend-specific code)
        status: u16,
        /// Response text
        message: String,
    },
}

impl RemoteError {
    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a new backend error
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::backend(status.as_u16(), err.to_string()),
            None => Self::network(err.to_string()),
        }
    }
}
