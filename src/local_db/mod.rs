//! # Local Database Module
//!
//! Local SQLite storage for offline-first operation. Holds the cached entity
//! records with their sync lifecycle status and the queue of mutations still to
//! be applied remotely.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, schema and migrations
//! - `schema.rs`: schema version bookkeeping
//! - `records.rs`: Local Record Store (put/get/getAll/delete, status updates)
//! - `sync.rs`: Sync Queue Store (enqueue/peekOldest/remove/incrementAttempts)
//!
//! This layer never talks to the network and never retries: every `sqlx` failure is
//! returned to the caller as `SyncError::Storage`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roofsync::local_db::LocalDatabase;
//! use roofsync::shared::{Record, RecordTable};
//! use serde_json::json;
//!
//! # async fn example() -> roofsync::shared::Result<()> {
//! let db = LocalDatabase::open("/tmp/roofsync.db").await?;
//! db.put_record(RecordTable::Clients, &Record::new("c1", json!({"id": "c1"}))).await?;
//! let clients = db.get_all_records(RecordTable::Clients).await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;
pub mod records;
pub mod sync;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::record::RecordStatus;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Uses WAL mode so readers are not blocked by the sync engine's writes.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::debug!("[LOCAL_DB] Opened {}", path.display());
        Self::with_pool(pool).await
    }

    /// Open the database configured in `config`
    pub async fn open_with_config(config: &SyncConfig) -> Result<Self> {
        Self::open(config.resolved_database_path()).await
    }

    /// Open a private in-memory database
    ///
    /// A single long-lived connection keeps the data alive for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;

        self.run_migrations().await
    }

    /// Apply pending migrations recorded in `schema_migrations`
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let (current_version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        let current_version = current_version as i32;
        if current_version > schema::CURRENT_SCHEMA_VERSION {
            return Err(SyncError::corrupt(
                "schema_migrations",
                format!(
                    "database is at version {}, this build supports {}",
                    current_version,
                    schema::CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if !schema::needs_migration(current_version) {
            tracing::debug!("[LOCAL_DB] Schema is current (version {})", current_version);
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version) {
            // Version 1 is the base schema created above; later versions add statements here.
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(encode_timestamp(Utc::now()))
                .execute(&self.pool)
                .await?;
            tracing::info!("[LOCAL_DB] Applied schema migration {}", version);
        }

        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Record counts per status and queue length, for dashboards
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM records GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = DatabaseStats::default();
        for (status, count) in rows {
            let count = count as u64;
            match RecordStatus::parse(&status) {
                Some(RecordStatus::Local) => stats.local_records = count,
                Some(RecordStatus::Syncing) => stats.syncing_records = count,
                Some(RecordStatus::Synced) => stats.synced_records = count,
                Some(RecordStatus::Error) => stats.error_records = count,
                None => return Err(SyncError::corrupt("records", format!("unknown status '{}'", status))),
            }
        }
        stats.pending_operations = self.pending_count().await?;

        Ok(stats)
    }
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub local_records: u64,
    pub syncing_records: u64,
    pub synced_records: u64,
    pub error_records: u64,
    /// Queue items awaiting remote application
    pub pending_operations: u64,
}

/// Fixed-width RFC 3339 so that text order matches time order
pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(table: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SyncError::corrupt(table, format!("bad timestamp '{}': {}", raw, e)))
}

pub(crate) fn decode_optional_timestamp(
    table: &'static str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(|raw| decode_timestamp(table, raw)).transpose()
}
