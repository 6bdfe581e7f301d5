//! # Sync Engine
//!
//! Drains the Sync Queue Store against the remote backend whenever the connectivity
//! monitor reports online.
//!
//! ## Guarantees
//!
//! - **Serialized**: one queue item at a time. A drain requested while another is in
//!   flight returns [`DrainOutcome::Busy`] without touching anything.
//! - **Ordered**: items are applied oldest `created_at` first, across all tables.
//! - **Bounded retries**: the attempt counter is bumped before each remote call, so an
//!   item gets exactly `max_sync_attempts` remote calls before it is dropped and its
//!   record is marked `error`.
//!
//! The local bookkeeping after a successful remote call is not atomic with that call;
//! a crash in between replays the mutation on the next drain.
//!
//! ## Components
//!
//! - `network_monitor.rs`: online/offline state and transition events
//! - `scheduler.rs`: drain triggers (reconnect, periodic timer, manual)
//! - `sync_state.rs`: drain state machine and outcomes
//! - `metrics.rs`: counters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roofsync::local_db::LocalDatabase;
//! use roofsync::remote::RestBackend;
//! use roofsync::shared::EventBus;
//! use roofsync::sync::{ConnectivityMonitor, SyncEngine};
//!
//! # async fn example() -> roofsync::shared::Result<()> {
//! let events = Arc::new(EventBus::new());
//! let connectivity = Arc::new(ConnectivityMonitor::new(true, Arc::clone(&events)));
//! let engine = SyncEngine::new(
//!     LocalDatabase::open("/tmp/roofsync.db").await?,
//!     Arc::new(RestBackend::new("https://example.supabase.co")),
//!     connectivity,
//!     events,
//! );
//!
//! let report = engine.start_sync().await?;
//! println!("applied {} item(s), stopped on {:?}", report.applied, report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod metrics;
pub mod network_monitor;
pub mod scheduler;
pub mod sync_state;

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use crate::local_db::LocalDatabase;
use crate::remote::RemoteBackend;
use crate::shared::config::{SyncConfig, DEFAULT_MAX_SYNC_ATTEMPTS};
use crate::shared::error::{RemoteError, Result};
use crate::shared::event::{EventBus, SyncErrorReason, SyncEvent};
use crate::shared::record::{QueueItem, RecordStatus, SyncAction};

pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use network_monitor::ConnectivityMonitor;
pub use scheduler::{SchedulerHandle, SyncScheduler, SyncTrigger};
pub use sync_state::{DrainOutcome, DrainState, SyncReport, SyncStatus};

use sync_state::DrainFlag;

/// Queue draining engine
pub struct SyncEngine {
    db: LocalDatabase,
    remote: Arc<dyn RemoteBackend>,
    connectivity: Arc<ConnectivityMonitor>,
    events: Arc<EventBus>,
    max_sync_attempts: u32,
    drain: DrainFlag,
    metrics: Mutex<SyncMetrics>,
}

impl SyncEngine {
    /// Create an engine with the default attempt cap
    pub fn new(
        db: LocalDatabase,
        remote: Arc<dyn RemoteBackend>,
        connectivity: Arc<ConnectivityMonitor>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            remote,
            connectivity,
            events,
            max_sync_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
            drain: DrainFlag::default(),
            metrics: Mutex::new(SyncMetrics::new()),
        }
    }

    /// Override the attempt cap
    pub fn with_max_attempts(mut self, max_sync_attempts: u32) -> Self {
        self.max_sync_attempts = max_sync_attempts.max(1);
        self
    }

    /// Apply engine settings from the configuration
    pub fn configured(self, config: &SyncConfig) -> Self {
        self.with_max_attempts(config.max_sync_attempts)
    }

    /// One drain iteration: apply the oldest queue item, if any
    ///
    /// Local storage failures are returned as `Err` and leave the item in place.
    pub async fn process_sync_queue(&self) -> Result<DrainOutcome> {
        if !self.connectivity.is_online() {
            tracing::debug!("[SYNC] Offline, drain not attempted");
            return Ok(DrainOutcome::Offline);
        }

        let Some(_guard) = self.drain.try_acquire() else {
            tracing::debug!("[SYNC] Drain already in progress");
            return Ok(DrainOutcome::Busy);
        };

        self.drain_one().await
    }

    /// Drain until the queue is empty or an iteration does not succeed
    ///
    /// Failed items are left for the next trigger instead of being retried here.
    pub async fn start_sync(&self) -> Result<SyncReport> {
        let mut applied = 0;
        loop {
            match self.process_sync_queue().await? {
                DrainOutcome::Applied(_) => applied += 1,
                outcome => {
                    if applied > 0 || outcome.item().is_some() {
                        tracing::info!(
                            "[SYNC] Sync run finished: {} applied, stopped on {}",
                            applied,
                            outcome_label(&outcome)
                        );
                    }
                    return Ok(SyncReport { applied, outcome });
                }
            }
        }
    }

    async fn drain_one(&self) -> Result<DrainOutcome> {
        let Some(mut item) = self.db.peek_oldest().await? else {
            return Ok(DrainOutcome::Empty);
        };

        if item.attempts >= self.max_sync_attempts {
            return self.exhaust(item).await;
        }

        // Count the attempt before making it.
        match self.db.increment_attempts(&item.id).await? {
            Some(attempts) => item.attempts = attempts,
            None => {
                tracing::warn!("[SYNC] Queue item {} vanished before its attempt", item.id);
                return Ok(DrainOutcome::Empty);
            }
        }

        tracing::debug!(
            "[SYNC] Applying {} {} {} (attempt {}/{})",
            item.action.as_str(),
            item.table,
            item.record_id,
            item.attempts,
            self.max_sync_attempts
        );

        let started = Instant::now();
        let result = self.dispatch(&item).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.acknowledge(&item).await?;
                self.metrics.lock().record_success(elapsed);
                tracing::info!("[SYNC] Synced {}", item.id);
                self.events.emit(&SyncEvent::SyncSuccess { item: item.clone() });
                Ok(DrainOutcome::Applied(item))
            }
            Err(error) => {
                let detail = error.to_string();
                self.db.record_failure(&item.id, &detail).await?;
                item.last_error = Some(detail.clone());
                self.metrics.lock().record_failure(elapsed, &detail);
                tracing::warn!(
                    "[SYNC] Attempt {}/{} for {} failed: {}",
                    item.attempts,
                    self.max_sync_attempts,
                    item.id,
                    detail
                );
                self.events.emit(&SyncEvent::SyncError {
                    item: item.clone(),
                    reason: SyncErrorReason::Remote(detail),
                });
                Ok(DrainOutcome::Failed { item, error })
            }
        }
    }

    async fn dispatch(&self, item: &QueueItem) -> std::result::Result<(), RemoteError> {
        match item.action {
            SyncAction::Create => self.remote.insert(&item.table, &item.data).await,
            SyncAction::Update => {
                self.remote
                    .update(&item.table, &item.record_id, &item.data)
                    .await
            }
            SyncAction::Delete => self.remote.delete(&item.table, &item.record_id).await,
        }
    }

    /// Dequeue after a remote success and update the owning record
    async fn acknowledge(&self, item: &QueueItem) -> Result<()> {
        let status = self.db.acknowledge(item, Utc::now()).await?;
        if status == Some(RecordStatus::Syncing) {
            tracing::debug!("[SYNC] {} still has queued edits", item.record_id);
        }
        Ok(())
    }

    /// Drop an item that used up its attempts, without calling the backend
    async fn exhaust(&self, item: QueueItem) -> Result<DrainOutcome> {
        self.db.discard_exhausted(&item).await?;

        self.metrics.lock().record_exhausted();
        tracing::error!(
            "[SYNC] Giving up on {} after {} attempts (last error: {})",
            item.id,
            item.attempts,
            item.last_error.as_deref().unwrap_or("none")
        );
        self.events.emit(&SyncEvent::SyncError {
            item: item.clone(),
            reason: SyncErrorReason::TooManyAttempts,
        });
        Ok(DrainOutcome::Exhausted(item))
    }

    /// Queue items awaiting remote application
    pub async fn pending_count(&self) -> Result<u64> {
        self.db.pending_count().await
    }

    /// Queue items awaiting remote application for one table
    pub async fn pending_count_for(&self, table: &str) -> Result<u64> {
        self.db.pending_count_for(table).await
    }

    pub fn drain_state(&self) -> DrainState {
        self.drain.state()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.lock().snapshot()
    }

    /// Everything a sync indicator needs
    pub async fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            is_online: self.connectivity.is_online(),
            drain_state: self.drain_state(),
            pending_operations: self.pending_count().await?,
            metrics: self.metrics(),
        })
    }

    pub fn max_sync_attempts(&self) -> u32 {
        self.max_sync_attempts
    }

    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("max_sync_attempts", &self.max_sync_attempts)
            .field("drain_state", &self.drain.state())
            .finish_non_exhaustive()
    }
}

fn outcome_label(outcome: &DrainOutcome) -> &'static str {
    match outcome {
        DrainOutcome::Offline => "offline",
        DrainOutcome::Busy => "busy",
        DrainOutcome::Empty => "empty queue",
        DrainOutcome::Applied(_) => "applied",
        DrainOutcome::Failed { .. } => "remote failure",
        DrainOutcome::Exhausted(_) => "exhausted item",
    }
}
