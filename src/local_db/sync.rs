//! # Sync Queue Store
//!
//! Durable queue of pending mutations. Items are drained oldest first across all
//! tables: `created_at` ascending, with the insertion sequence as tie-breaker.
//!
//! Writes that touch both a record and its queue items (`put_and_enqueue`,
//! `delete_and_enqueue`, `acknowledge`, `discard_exhausted`) run in one transaction,
//! so a record is `synced` exactly when no queue item references it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roofsync::local_db::LocalDatabase;
//! use roofsync::shared::SyncAction;
//! use serde_json::json;
//!
//! # async fn example(db: LocalDatabase) -> roofsync::shared::Result<()> {
//! let id = db.enqueue("inspections", SyncAction::Create, json!({"id": "X"})).await?;
//!
//! while let Some(item) = db.peek_oldest().await? {
//!     db.increment_attempts(&item.id).await?;
//!     // apply remotely...
//!     db.remove_queue_item(&item.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::local_db::records::{mark_synced, remove_record, update_record_status, upsert_record};
use crate::local_db::{decode_optional_timestamp, decode_timestamp, encode_timestamp, LocalDatabase};
use crate::shared::error::{Result, SyncError};
use crate::shared::record::{
    record_id_of, QueueItem, Record, RecordStatus, RecordTable, SyncAction,
};

/// How many times a colliding queue id is nudged forward before giving up
const ENQUEUE_ID_RETRIES: u32 = 64;

const QUEUE_COLUMNS: &str =
    "id, table_name, record_id, action, data, attempts, created_at, last_attempt_at, last_error";

const DRAIN_ORDER: &str = "ORDER BY created_at ASC, seq ASC";

impl LocalDatabase {
    /// Queue a mutation stamped with the current time; returns the queue item id
    pub async fn enqueue(&self, table: &str, action: SyncAction, payload: Value) -> Result<String> {
        self.enqueue_at(table, action, payload, Utc::now()).await
    }

    /// Queue a mutation with an explicit enqueue time
    ///
    /// `payload` is stored as a snapshot and must carry an `id`. If the derived id is
    /// already taken the timestamp moves forward one microsecond at a time.
    pub async fn enqueue_at(
        &self,
        table: &str,
        action: SyncAction,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        insert_queue_item(&mut conn, table, action, &payload, created_at).await
    }

    /// Write a record and queue its mutation in one transaction; returns the queue
    /// item id
    ///
    /// The queued payload is the record's data as written.
    pub async fn put_and_enqueue(
        &self,
        table: RecordTable,
        record: &Record,
        action: SyncAction,
    ) -> Result<String> {
        let mut tx = self.pool.begin().await?;
        upsert_record(&mut tx, table, record).await?;
        let id = insert_queue_item(&mut tx, table.as_str(), action, &record.data, Utc::now()).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Delete a record and queue the remote delete in one transaction
    pub async fn delete_and_enqueue(&self, table: RecordTable, id: &str) -> Result<String> {
        let mut tx = self.pool.begin().await?;
        remove_record(&mut tx, table, id).await?;
        let queue_id = insert_queue_item(
            &mut tx,
            table.as_str(),
            SyncAction::Delete,
            &json!({ "id": id }),
            Utc::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(queue_id)
    }

    /// Drop an applied item and settle its record; returns the record's new status
    ///
    /// The record only becomes `synced` if nothing else is queued for it at commit
    /// time. Items for unknown tables or missing records return `None`.
    pub async fn acknowledge(
        &self,
        item: &QueueItem,
        at: DateTime<Utc>,
    ) -> Result<Option<RecordStatus>> {
        let mut tx = self.pool.begin().await?;
        delete_queue_item(&mut tx, &item.id).await?;
        let status = match item.record_table() {
            Some(table) => mark_synced(&mut tx, table, &item.record_id, at).await?,
            None => None,
        };
        tx.commit().await?;
        Ok(status)
    }

    /// Drop an item that ran out of attempts and flag its record as `error`
    pub async fn discard_exhausted(&self, item: &QueueItem) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_queue_item(&mut tx, &item.id).await?;
        if let Some(table) = item.record_table() {
            update_record_status(&mut tx, table, &item.record_id, RecordStatus::Error).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Oldest pending item across all tables
    pub async fn peek_oldest(&self) -> Result<Option<QueueItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sync_queue {} LIMIT 1",
            QUEUE_COLUMNS, DRAIN_ORDER
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(queue_item_from_row).transpose()
    }

    /// Fetch one queue item
    pub async fn get_queue_item(&self, id: &str) -> Result<Option<QueueItem>> {
        let row = sqlx::query(&format!("SELECT {} FROM sync_queue WHERE id = ?", QUEUE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(queue_item_from_row).transpose()
    }

    /// Every pending item in drain order
    pub async fn list_pending(&self) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(&format!("SELECT {} FROM sync_queue {}", QUEUE_COLUMNS, DRAIN_ORDER))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(queue_item_from_row).collect()
    }

    /// Delete a queue item; absent ids are ignored
    pub async fn remove_queue_item(&self, id: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        delete_queue_item(&mut conn, id).await
    }

    /// Atomically bump the attempt counter; returns the new count
    ///
    /// Called before the remote call so an interrupted attempt still counts.
    pub async fn increment_attempts(&self, id: &str) -> Result<Option<u32>> {
        let attempts: Option<(i64,)> = sqlx::query_as(
            "UPDATE sync_queue SET attempts = attempts + 1, last_attempt_at = ?
             WHERE id = ?
             RETURNING attempts",
        )
        .bind(encode_timestamp(Utc::now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        attempts
            .map(|(n,)| attempts_from_db(n))
            .transpose()
    }

    /// Store the error text of the latest failed attempt
    pub async fn record_failure(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE sync_queue SET last_error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of queued items
    pub async fn pending_count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Number of queued items for one table
    pub async fn pending_count_for(&self, table: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue WHERE table_name = ?")
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Whether any queued item still targets `record_id`
    pub async fn has_pending_for(&self, table: &str, record_id: &str) -> Result<bool> {
        let (exists,): (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM sync_queue WHERE table_name = ? AND record_id = ?)",
        )
        .bind(table)
        .bind(record_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }
}

async fn insert_queue_item(
    conn: &mut SqliteConnection,
    table: &str,
    action: SyncAction,
    payload: &Value,
    created_at: DateTime<Utc>,
) -> Result<String> {
    let record_id = record_id_of(payload).ok_or_else(|| SyncError::missing_record_id(table))?;
    let data = serde_json::to_string(payload)?;
    let mut created_at = created_at.trunc_subsecs(6);

    for _ in 0..ENQUEUE_ID_RETRIES {
        let id = QueueItem::make_id(table, &record_id, created_at);
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sync_queue (id, table_name, record_id, action, data, attempts, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(table)
        .bind(&record_id)
        .bind(action.as_str())
        .bind(&data)
        .bind(encode_timestamp(created_at))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            tracing::debug!("[QUEUE] Enqueued {} ({})", id, action.as_str());
            return Ok(id);
        }
        created_at += chrono::Duration::microseconds(1);
    }

    Err(SyncError::QueueIdExhausted(format!("{}/{}", table, record_id)))
}

async fn delete_queue_item(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM sync_queue WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn attempts_from_db(raw: i64) -> Result<u32> {
    u32::try_from(raw).map_err(|_| SyncError::corrupt("sync_queue", format!("bad attempt count {}", raw)))
}

fn queue_item_from_row(row: &SqliteRow) -> Result<QueueItem> {
    let action: String = row.try_get("action")?;
    let action = SyncAction::parse(&action)
        .ok_or_else(|| SyncError::corrupt("sync_queue", format!("unknown action '{}'", action)))?;
    let data: String = row.try_get("data")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(QueueItem {
        id: row.try_get("id")?,
        table: row.try_get("table_name")?,
        record_id: row.try_get("record_id")?,
        action,
        data: serde_json::from_str(&data)?,
        attempts: attempts_from_db(row.try_get("attempts")?)?,
        created_at: decode_timestamp("sync_queue", &created_at)?,
        last_attempt_at: decode_optional_timestamp("sync_queue", row.try_get("last_attempt_at")?)?,
        last_error: row.try_get("last_error")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn db() -> LocalDatabase {
        LocalDatabase::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_and_remove() {
        let db = db().await;

        let id = db
            .enqueue("inspections", SyncAction::Create, json!({"id": "X", "tiles": 40}))
            .await
            .unwrap();
        assert!(id.starts_with("inspections-X-"));

        let item = db.peek_oldest().await.unwrap().unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.record_id, "X");
        assert_eq!(item.data["tiles"], 40);
        assert_eq!(db.pending_count().await.unwrap(), 1);

        db.remove_queue_item(&id).await.unwrap();
        db.remove_queue_item(&id).await.unwrap();
        assert!(db.peek_oldest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_requires_record_id() {
        let db = db().await;
        let err = db
            .enqueue("clients", SyncAction::Update, json!({"name": "ACME"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingRecordId { .. }));
        assert_eq!(db.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_peek_oldest_is_global() {
        let db = db().await;
        db.enqueue_at("clients", SyncAction::Create, json!({"id": "b"}), at(2))
            .await
            .unwrap();
        db.enqueue_at("inspections", SyncAction::Create, json!({"id": "a"}), at(1))
            .await
            .unwrap();

        let oldest = db.peek_oldest().await.unwrap().unwrap();
        assert_eq!(oldest.table, "inspections");

        let order: Vec<String> = db
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.record_id)
            .collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_same_timestamp_gets_distinct_ids() {
        let db = db().await;
        let first = db
            .enqueue_at("clients", SyncAction::Create, json!({"id": "c"}), at(5))
            .await
            .unwrap();
        let second = db
            .enqueue_at("clients", SyncAction::Update, json!({"id": "c", "v": 2}), at(5))
            .await
            .unwrap();

        assert_ne!(first, second);
        let pending = db.list_pending().await.unwrap();
        assert_eq!(pending[0].action, SyncAction::Create);
        assert_eq!(pending[1].action, SyncAction::Update);
    }

    #[tokio::test]
    async fn test_increment_attempts() {
        let db = db().await;
        let id = db
            .enqueue("clients", SyncAction::Delete, json!({"id": "c"}))
            .await
            .unwrap();

        assert_eq!(db.increment_attempts(&id).await.unwrap(), Some(1));
        assert_eq!(db.increment_attempts(&id).await.unwrap(), Some(2));
        assert_eq!(db.increment_attempts("missing").await.unwrap(), None);

        let item = db.get_queue_item(&id).await.unwrap().unwrap();
        assert_eq!(item.attempts, 2);
        assert!(item.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_record_failure_and_pending_queries() {
        let db = db().await;
        let id = db
            .enqueue("inspections", SyncAction::Update, json!({"id": "i1"}))
            .await
            .unwrap();
        db.record_failure(&id, "Network error: reset").await.unwrap();

        let item = db.get_queue_item(&id).await.unwrap().unwrap();
        assert_eq!(item.last_error.as_deref(), Some("Network error: reset"));

        assert!(db.has_pending_for("inspections", "i1").await.unwrap());
        assert!(!db.has_pending_for("clients", "i1").await.unwrap());
        assert_eq!(db.pending_count_for("inspections").await.unwrap(), 1);
        assert_eq!(db.pending_count_for("clients").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_not_live() {
        let db = db().await;
        let mut payload = json!({"id": "i1", "notes": "before"});
        db.enqueue("inspections", SyncAction::Update, payload.clone())
            .await
            .unwrap();
        payload["notes"] = json!("after");

        let item = db.peek_oldest().await.unwrap().unwrap();
        assert_eq!(item.data["notes"], "before");
    }

    #[tokio::test]
    async fn test_put_and_enqueue_is_atomic() {
        let db = db().await;
        let record = Record::new("i1", json!({"id": "i1", "pitch": 30}))
            .with_status(RecordStatus::Syncing);

        let queue_id = db
            .put_and_enqueue(RecordTable::Inspections, &record, SyncAction::Create)
            .await
            .unwrap();

        let item = db.get_queue_item(&queue_id).await.unwrap().unwrap();
        assert_eq!(item.data, record.data);
        assert!(db.get_record(RecordTable::Inspections, "i1").await.unwrap().is_some());

        // A payload without an id rolls the record write back too.
        let orphan = Record::new("i2", json!({"pitch": 10}));
        let err = db
            .put_and_enqueue(RecordTable::Inspections, &orphan, SyncAction::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingRecordId { .. }));
        assert!(db.get_record(RecordTable::Inspections, "i2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acknowledge_settles_record() {
        let db = db().await;
        let record = Record::new("i1", json!({"id": "i1"})).with_status(RecordStatus::Syncing);
        db.put_and_enqueue(RecordTable::Inspections, &record, SyncAction::Create)
            .await
            .unwrap();
        db.put_and_enqueue(RecordTable::Inspections, &record, SyncAction::Update)
            .await
            .unwrap();

        let first = db.peek_oldest().await.unwrap().unwrap();
        assert_eq!(
            db.acknowledge(&first, Utc::now()).await.unwrap(),
            Some(RecordStatus::Syncing)
        );
        let second = db.peek_oldest().await.unwrap().unwrap();
        assert_eq!(
            db.acknowledge(&second, Utc::now()).await.unwrap(),
            Some(RecordStatus::Synced)
        );
        assert_eq!(db.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_discard_exhausted_flags_record() {
        let db = db().await;
        let record = Record::new("c1", json!({"id": "c1"})).with_status(RecordStatus::Syncing);
        db.put_and_enqueue(RecordTable::Clients, &record, SyncAction::Create)
            .await
            .unwrap();
        let item = db.peek_oldest().await.unwrap().unwrap();

        db.discard_exhausted(&item).await.unwrap();

        assert!(db.get_queue_item(&item.id).await.unwrap().is_none());
        let stored = db.get_record(RecordTable::Clients, "c1").await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Error);
    }

    #[tokio::test]
    async fn test_delete_and_enqueue() {
        let db = db().await;
        db.put_record(RecordTable::Clients, &Record::new("c1", json!({"id": "c1"})))
            .await
            .unwrap();

        db.delete_and_enqueue(RecordTable::Clients, "c1").await.unwrap();

        assert!(db.get_record(RecordTable::Clients, "c1").await.unwrap().is_none());
        let item = db.peek_oldest().await.unwrap().unwrap();
        assert_eq!(item.action, SyncAction::Delete);
        assert_eq!(item.data, json!({"id": "c1"}));
    }
}
