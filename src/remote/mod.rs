//! # Remote Backend
//!
//! The sync engine applies queued mutations through [`RemoteBackend`]. Any `Ok` is
//! treated as an acknowledgment and any `Err` as a retryable failure.
//!
//! Implementations should tolerate receiving the same mutation twice: a crash
//! between a successful remote call and the local dequeue replays the item.

pub mod rest;

use async_trait::async_trait;
use serde_json::Value;

use crate::shared::error::RemoteError;

pub use rest::RestBackend;

/// Remote side of the sync protocol
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Insert `payload` into `table`
    async fn insert(&self, table: &str, payload: &Value) -> Result<(), RemoteError>;

    /// Update the row of `table` whose id is `id`
    async fn update(&self, table: &str, id: &str, payload: &Value) -> Result<(), RemoteError>;

    /// Delete the row of `table` whose id is `id`
    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError>;
}
