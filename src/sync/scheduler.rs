//! # Sync Scheduler
//!
//! Background task deciding when to drain the queue:
//!
//! - **Reconnect**: the connectivity monitor transitions to online
//! - **Periodic**: every `interval` while online (the first tick fires at start-up,
//!   which replays anything left over from a previous run)
//! - **Manual**: a [`SyncTrigger`] is pulled, e.g. after a local write
//!
//! Each trigger runs [`SyncEngine::start_sync`] to completion before the next one is
//! looked at. Manual triggers arriving during a run are coalesced into one.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::sync::SyncEngine;

/// Why a drain was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Reconnected,
    Periodic,
    Manual,
}

/// Cloneable handle that requests a drain
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Request a drain; a no-op if one is already pending or the scheduler stopped
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Spawns the scheduler task
pub struct SyncScheduler;

impl SyncScheduler {
    /// Start scheduling drains for `engine`
    pub fn spawn(engine: Arc<SyncEngine>, interval: Duration) -> SchedulerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_scheduler(engine, interval, trigger_rx, shutdown_rx));
        tracing::info!("[SCHEDULER] Started with {:?} interval", interval);

        SchedulerHandle {
            trigger: SyncTrigger { tx: trigger_tx },
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owner of the scheduler task; dropping it aborts the task
#[derive(Debug)]
pub struct SchedulerHandle {
    trigger: SyncTrigger,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Trigger usable from other components
    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Request an immediate drain
    pub fn sync_now(&self) {
        self.trigger.trigger();
    }

    /// Stop the task, letting a running drain finish first
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("[SCHEDULER] Task ended abnormally: {}", e);
            }
        }
        tracing::info!("[SCHEDULER] Stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_scheduler(
    engine: Arc<SyncEngine>,
    interval: Duration,
    mut triggers: mpsc::Receiver<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut connectivity = engine.connectivity().subscribe();
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let reason = tokio::select! {
            _ = &mut shutdown => break,
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*connectivity.borrow_and_update() {
                    continue;
                }
                TriggerReason::Reconnected
            }
            _ = ticker.tick() => {
                if !engine.connectivity().is_online() {
                    continue;
                }
                TriggerReason::Periodic
            }
            Some(()) = triggers.recv() => TriggerReason::Manual,
        };

        tracing::debug!("[SCHEDULER] Drain triggered: {:?}", reason);
        match engine.start_sync().await {
            Ok(report) if report.applied > 0 => {
                tracing::debug!("[SCHEDULER] {:?} run applied {} item(s)", reason, report.applied);
            }
            Ok(_) => {}
            Err(e) => tracing::error!("[SCHEDULER] Drain stopped by local storage failure: {}", e),
        }
    }
}
