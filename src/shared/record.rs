//! Record and Queue Item Data Structures
//!
//! The locally cached entities (`Record`) and the pending mutations waiting to be
//! applied remotely (`QueueItem`).

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::shared::error::SyncError;

/// Entity collections whose records carry a local sync lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTable {
    /// Roof inspections
    Inspections,
    /// Clients owning the inspected buildings
    Clients,
}

impl RecordTable {
    /// All record tables
    pub const ALL: [RecordTable; 2] = [RecordTable::Inspections, RecordTable::Clients];

    /// Table name as stored locally and remotely
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordTable::Inspections => "inspections",
            RecordTable::Clients => "clients",
        }
    }

    /// Look up a record table by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.as_str() == name)
    }
}

impl fmt::Display for RecordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordTable {
    type Err = SyncError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::from_name(name).ok_or_else(|| SyncError::UnknownTable(name.to_string()))
    }
}

/// Local lifecycle state of a record; never sent to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Written locally while offline
    Local,
    /// Written locally, remote application pending
    Syncing,
    /// Acknowledged by the backend, nothing pending
    Synced,
    /// Gave up after too many failed attempts
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Local => "local",
            RecordStatus::Syncing => "syncing",
            RecordStatus::Synced => "synced",
            RecordStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "local" => Some(RecordStatus::Local),
            "syncing" => Some(RecordStatus::Syncing),
            "synced" => Some(RecordStatus::Synced),
            "error" => Some(RecordStatus::Error),
            _ => None,
        }
    }
}

/// Locally cached entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable identifier
    pub id: String,
    /// Local lifecycle state
    pub status: RecordStatus,
    /// First remote acknowledgment
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Entity-specific fields
    pub data: Value,
}

impl Record {
    /// Create a new unsynced record
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: id.into(),
            status: RecordStatus::Local,
            synced_at: None,
            created_at: now,
            updated_at: now,
            data,
        }
    }

    /// Set the lifecycle status
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }
}

/// Kind of remote mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(SyncAction::Create),
            "update" => Some(SyncAction::Update),
            "delete" => Some(SyncAction::Delete),
            _ => None,
        }
    }
}

/// Pending mutation awaiting remote application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// `{table}-{recordId}-{enqueueMicros}`
    pub id: String,
    /// Owning collection
    pub table: String,
    /// Id of the record the payload targets
    pub record_id: String,
    pub action: SyncAction,
    /// Payload snapshot taken at enqueue time
    pub data: Value,
    /// Remote attempts already started
    pub attempts: u32,
    /// Drain order key
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Deterministic queue item id
    pub fn make_id(table: &str, record_id: &str, created_at: DateTime<Utc>) -> String {
        format!("{}-{}-{}", table, record_id, created_at.timestamp_micros())
    }

    /// Record table owning this item, if it has a local lifecycle
    pub fn record_table(&self) -> Option<RecordTable> {
        RecordTable::from_name(&self.table)
    }
}

/// Extract the record id carried by a payload
///
/// Accepts string ids and integer ids (server-assigned keys).
pub fn record_id_of(data: &Value) -> Option<String> {
    match data.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_record_table_names() {
        assert_eq!(RecordTable::from_name("inspections"), Some(RecordTable::Inspections));
        assert_eq!(RecordTable::from_name("clients"), Some(RecordTable::Clients));
        assert_eq!(RecordTable::from_name("photos"), None);
        assert_eq!("clients".parse::<RecordTable>().ok(), Some(RecordTable::Clients));
        assert!(matches!(
            "photos".parse::<RecordTable>(),
            Err(SyncError::UnknownTable(name)) if name == "photos"
        ));
    }

    #[test]
    fn test_status_parse() {
        for status in [
            RecordStatus::Local,
            RecordStatus::Syncing,
            RecordStatus::Synced,
            RecordStatus::Error,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::parse("pending"), None);
    }

    #[test]
    fn test_queue_item_id() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_000).unwrap();
        assert_eq!(
            QueueItem::make_id("inspections", "X", at),
            "inspections-X-1700000000000123"
        );
    }

    #[test]
    fn test_record_id_of() {
        assert_eq!(record_id_of(&json!({"id": "abc"})), Some("abc".to_string()));
        assert_eq!(record_id_of(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(record_id_of(&json!({"id": ""})), None);
        assert_eq!(record_id_of(&json!({"name": "roof"})), None);
        assert_eq!(record_id_of(&json!("id")), None);
    }
}
