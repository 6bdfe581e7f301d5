//! Shared Module
//!
//! Types used by every layer of the sync stack: the record/queue data model, the
//! event bus, error types and configuration.

/// Record and queue item data structures
pub mod record;

/// Sync event bus
pub mod event;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, RemoteConfig, SyncConfig, SyncConfigBuilder};
pub use error::{RemoteError, Result, SyncError};
pub use event::{EventBus, EventKind, SubscriptionId, SyncErrorReason, SyncEvent};
pub use record::{QueueItem, Record, RecordStatus, RecordTable, SyncAction};
