//! # Local Record Store
//!
//! Durable per-entity storage of inspections and clients together with their sync
//! lifecycle status.
//!
//! - `put_record` inserts or overwrites by id and keeps the original `created_at`
//!   and iteration position of an existing record.
//! - `get_record` returns `None` on a miss.
//! - `delete_record` on an absent id is a no-op.
//!
//! The write helpers at the bottom take a bare connection so that the queue store
//! can run them inside its transactions.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::local_db::{decode_optional_timestamp, decode_timestamp, encode_timestamp, LocalDatabase};
use crate::shared::error::{Result, SyncError};
use crate::shared::record::{Record, RecordStatus, RecordTable};

const RECORD_COLUMNS: &str = "id, status, synced_at, created_at, updated_at, data";

impl LocalDatabase {
    /// Insert or overwrite a record; returns its id
    ///
    /// `updated_at` is stamped with the current time on every write. An existing
    /// `synced_at` is never cleared.
    pub async fn put_record(&self, table: RecordTable, record: &Record) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        upsert_record(&mut conn, table, record).await?;
        Ok(record.id.clone())
    }

    /// Fetch a record by id
    pub async fn get_record(&self, table: RecordTable, id: &str) -> Result<Option<Record>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM records WHERE table_name = ? AND id = ?",
            RECORD_COLUMNS
        ))
        .bind(table.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// All records of a table in insertion order
    pub async fn get_all_records(&self, table: RecordTable) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records WHERE table_name = ? ORDER BY rowid ASC",
            RECORD_COLUMNS
        ))
        .bind(table.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Remove a record
    pub async fn delete_record(&self, table: RecordTable, id: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        remove_record(&mut conn, table, id).await
    }

    /// Overwrite the lifecycle status; returns `false` if the record does not exist
    pub async fn set_record_status(
        &self,
        table: RecordTable,
        id: &str,
        status: RecordStatus,
    ) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        update_record_status(&mut conn, table, id, status).await
    }

    /// Record a remote acknowledgment; returns the resulting status, or `None` if the
    /// record does not exist
    ///
    /// The status becomes `synced` only if no queue item still targets the record,
    /// otherwise it stays `syncing`. The check and the write are one statement.
    /// `synced_at` keeps the first acknowledgment time.
    pub async fn mark_record_synced(
        &self,
        table: RecordTable,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<RecordStatus>> {
        let mut conn = self.pool.acquire().await?;
        mark_synced(&mut conn, table, id, at).await
    }

    /// Number of records of a table in a given status
    pub async fn count_records_by_status(
        &self,
        table: RecordTable,
        status: RecordStatus,
    ) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM records WHERE table_name = ? AND status = ?")
                .bind(table.as_str())
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

pub(crate) async fn upsert_record(
    conn: &mut SqliteConnection,
    table: RecordTable,
    record: &Record,
) -> Result<()> {
    let data = serde_json::to_string(&record.data)?;

    sqlx::query(
        "INSERT INTO records (table_name, id, status, synced_at, created_at, updated_at, data)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (table_name, id) DO UPDATE SET
            status = excluded.status,
            synced_at = COALESCE(records.synced_at, excluded.synced_at),
            updated_at = excluded.updated_at,
            data = excluded.data",
    )
    .bind(table.as_str())
    .bind(&record.id)
    .bind(record.status.as_str())
    .bind(record.synced_at.map(encode_timestamp))
    .bind(encode_timestamp(record.created_at))
    .bind(encode_timestamp(Utc::now()))
    .bind(&data)
    .execute(&mut *conn)
    .await?;

    tracing::debug!("[LOCAL_DB] put {}/{} ({})", table, record.id, record.status.as_str());
    Ok(())
}

pub(crate) async fn remove_record(
    conn: &mut SqliteConnection,
    table: RecordTable,
    id: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM records WHERE table_name = ? AND id = ?")
        .bind(table.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn update_record_status(
    conn: &mut SqliteConnection,
    table: RecordTable,
    id: &str,
    status: RecordStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE records SET status = ? WHERE table_name = ? AND id = ?")
        .bind(status.as_str())
        .bind(table.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_synced(
    conn: &mut SqliteConnection,
    table: RecordTable,
    id: &str,
    at: DateTime<Utc>,
) -> Result<Option<RecordStatus>> {
    let status: Option<(String,)> = sqlx::query_as(
        "UPDATE records SET
            status = CASE WHEN EXISTS (
                SELECT 1 FROM sync_queue
                WHERE sync_queue.table_name = records.table_name
                  AND sync_queue.record_id = records.id
            ) THEN ? ELSE ? END,
            synced_at = COALESCE(synced_at, ?)
         WHERE table_name = ? AND id = ?
         RETURNING status",
    )
    .bind(RecordStatus::Syncing.as_str())
    .bind(RecordStatus::Synced.as_str())
    .bind(encode_timestamp(at))
    .bind(table.as_str())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    status
        .map(|(raw,)| {
            RecordStatus::parse(&raw)
                .ok_or_else(|| SyncError::corrupt("records", format!("unknown status '{}'", raw)))
        })
        .transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    let status: String = row.try_get("status")?;
    let status = RecordStatus::parse(&status)
        .ok_or_else(|| SyncError::corrupt("records", format!("unknown status '{}'", status)))?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let data: String = row.try_get("data")?;

    Ok(Record {
        id: row.try_get("id")?,
        status,
        synced_at: decode_optional_timestamp("records", row.try_get("synced_at")?)?,
        created_at: decode_timestamp("records", &created_at)?,
        updated_at: decode_timestamp("records", &updated_at)?,
        data: serde_json::from_str(&data)?,
    })
}
