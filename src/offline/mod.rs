//! # Offline Record Repository
//!
//! Entry point for callers that mutate inspections and clients. Every mutation:
//!
//! 1. writes the record locally (status `local` when offline, `syncing` when online)
//!    and enqueues a snapshot of the payload in the same transaction, whether online
//!    or not, so a crash during the remote call never loses it,
//! 2. pulls the scheduler's trigger when online.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roofsync::offline::RecordRepository;
//! use roofsync::shared::RecordTable;
//! use serde_json::json;
//!
//! # async fn example(repository: RecordRepository) -> roofsync::shared::Result<()> {
//! let inspection = repository
//!     .create(RecordTable::Inspections, json!({"clientId": "c1", "roofType": "tile"}))
//!     .await?;
//! repository.delete(RecordTable::Inspections, &inspection.id).await?;
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::local_db::LocalDatabase;
use crate::shared::error::{Result, SyncError};
use crate::shared::record::{record_id_of, Record, RecordStatus, RecordTable, SyncAction};
use crate::sync::{ConnectivityMonitor, SyncTrigger};

/// Optimistic write-through repository
#[derive(Debug, Clone)]
pub struct RecordRepository {
    db: LocalDatabase,
    connectivity: Arc<ConnectivityMonitor>,
    trigger: Option<SyncTrigger>,
}

impl RecordRepository {
    pub fn new(db: LocalDatabase, connectivity: Arc<ConnectivityMonitor>) -> Self {
        Self {
            db,
            connectivity,
            trigger: None,
        }
    }

    /// Request a drain after each write made while online
    pub fn with_trigger(mut self, trigger: SyncTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Create a record; an `id` is generated when the payload has none
    pub async fn create(&self, table: RecordTable, mut data: Value) -> Result<Record> {
        let id = match record_id_of(&data) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                set_id(&mut data, table, &id)?;
                id
            }
        };

        let record = Record::new(id, data).with_status(self.pending_status());
        self.db
            .put_and_enqueue(table, &record, SyncAction::Create)
            .await?;

        tracing::debug!("[OFFLINE] Created {}/{}", table, record.id);
        self.nudge();
        self.reload(table, &record.id).await
    }

    /// Replace the fields of a record
    ///
    /// The payload's `id` is forced to `id`. Unknown records are created locally;
    /// existing ones keep their `created_at` and `synced_at`.
    pub async fn update(&self, table: RecordTable, id: &str, mut data: Value) -> Result<Record> {
        set_id(&mut data, table, id)?;

        let record = Record::new(id, data).with_status(self.pending_status());
        self.db
            .put_and_enqueue(table, &record, SyncAction::Update)
            .await?;

        tracing::debug!("[OFFLINE] Updated {}/{}", table, id);
        self.nudge();
        self.reload(table, id).await
    }

    /// Remove a record locally and queue its remote deletion
    pub async fn delete(&self, table: RecordTable, id: &str) -> Result<()> {
        self.db.delete_and_enqueue(table, id).await?;

        tracing::debug!("[OFFLINE] Deleted {}/{}", table, id);
        self.nudge();
        Ok(())
    }

    pub async fn get(&self, table: RecordTable, id: &str) -> Result<Option<Record>> {
        self.db.get_record(table, id).await
    }

    pub async fn list(&self, table: RecordTable) -> Result<Vec<Record>> {
        self.db.get_all_records(table).await
    }

    fn pending_status(&self) -> RecordStatus {
        if self.connectivity.is_online() {
            RecordStatus::Syncing
        } else {
            RecordStatus::Local
        }
    }

    fn nudge(&self) {
        if !self.connectivity.is_online() {
            return;
        }
        if let Some(trigger) = &self.trigger {
            trigger.trigger();
        }
    }

    async fn reload(&self, table: RecordTable, id: &str) -> Result<Record> {
        self.db
            .get_record(table, id)
            .await?
            .ok_or_else(|| SyncError::corrupt("records", format!("{}/{} missing after write", table, id)))
    }
}

fn set_id(data: &mut Value, table: RecordTable, id: &str) -> Result<()> {
    let object = data
        .as_object_mut()
        .ok_or_else(|| SyncError::missing_record_id(table.as_str()))?;
    object.insert("id".to_string(), Value::String(id.to_string()));
    Ok(())
}
