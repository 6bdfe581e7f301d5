//! RoofSync - Offline Sync Library
//!
//! Offline-first persistence for a roof-inspection field app. Inspections and clients
//! are written to an embedded SQLite store first, every mutation is recorded in a
//! durable sync queue, and the queue is replayed against a PostgREST-style backend
//! whenever the device is online.
//!
//! # Module Structure
//!
//! - **`shared`** - Types used by every layer
//!   - Record and queue item data model
//!   - Sync event bus
//!   - Error types and configuration
//!
//! - **`local_db`** - Embedded SQLite store
//!   - Local record store (`records` table)
//!   - Sync queue store (`sync_queue` table)
//!   - Schema versioning
//!
//! - **`remote`** - Remote backend port and its REST adapter
//!
//! - **`sync`** - Sync engine
//!   - Drain loop with bounded retries
//!   - Connectivity monitor
//!   - Background scheduler
//!
//! - **`offline`** - Write-through repository used by the app's data layer
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roofsync::local_db::LocalDatabase;
//! use roofsync::offline::RecordRepository;
//! use roofsync::remote::RestBackend;
//! use roofsync::shared::{EventBus, EventKind, RecordTable, SyncConfig};
//! use roofsync::sync::{ConnectivityMonitor, SyncEngine, SyncScheduler};
//! use serde_json::json;
//!
//! # async fn example() -> roofsync::shared::Result<()> {
//! let config = SyncConfig::from_env()?;
//! let db = LocalDatabase::open_with_config(&config).await?;
//!
//! let events = Arc::new(EventBus::new());
//! events.subscribe(EventKind::SyncError, |event| eprintln!("sync failed: {:?}", event));
//!
//! let connectivity = Arc::new(ConnectivityMonitor::new(true, Arc::clone(&events)));
//! let engine = Arc::new(
//!     SyncEngine::new(
//!         db.clone(),
//!         Arc::new(RestBackend::from_config(&config)?),
//!         Arc::clone(&connectivity),
//!         events,
//!     )
//!     .configured(&config),
//! );
//! let scheduler = SyncScheduler::spawn(Arc::clone(&engine), config.sync_interval);
//!
//! let repository = RecordRepository::new(db, connectivity).with_trigger(scheduler.trigger());
//! repository
//!     .create(RecordTable::Inspections, json!({"address": "12 High St"}))
//!     .await?;
//!
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - `SyncEngine` is shared behind an `Arc`; at most one drain runs at a time
//! - `EventBus` listeners are called synchronously on the emitting task
//! - `LocalDatabase` wraps a connection pool and is cheap to clone

/// Shared types and data structures
pub mod shared;

/// Embedded SQLite persistence
pub mod local_db;

/// Remote backend port and adapters
pub mod remote;

/// Sync engine, connectivity and scheduling
pub mod sync;

/// Write-through record repository
pub mod offline;
