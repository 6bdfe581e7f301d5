//! # Sync State
//!
//! Drain state machine (`Idle -> Draining -> Idle`), per-drain outcomes and the
//! status snapshot shown by sync indicators.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::shared::error::RemoteError;
use crate::shared::record::QueueItem;
use crate::sync::metrics::MetricsSnapshot;

/// Whether a drain is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainState {
    Idle,
    Draining,
}

/// Single-flight guard for draining
#[derive(Debug, Default)]
pub(crate) struct DrainFlag {
    draining: AtomicBool,
}

impl DrainFlag {
    /// Enter `Draining`, or `None` if a drain already runs
    pub(crate) fn try_acquire(&self) -> Option<DrainGuard<'_>> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard { flag: self })
    }

    pub(crate) fn state(&self) -> DrainState {
        if self.draining.load(Ordering::Acquire) {
            DrainState::Draining
        } else {
            DrainState::Idle
        }
    }
}

/// Returns the flag to `Idle` when dropped, including when the drain future is
/// cancelled or panics
#[derive(Debug)]
pub(crate) struct DrainGuard<'a> {
    flag: &'a DrainFlag,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.draining.store(false, Ordering::Release);
    }
}

/// Result of one drain iteration
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    /// Offline; nothing was touched
    Offline,
    /// Another drain is in flight; nothing was touched
    Busy,
    /// The queue is empty
    Empty,
    /// The item was applied remotely and dequeued
    Applied(QueueItem),
    /// The remote call failed; the item stays queued with its attempt counted
    Failed {
        item: QueueItem,
        error: RemoteError,
    },
    /// The item had used up its attempts; it was dropped and its record marked `error`
    Exhausted(QueueItem),
}

impl DrainOutcome {
    /// `Empty` and `Applied` count as success
    pub fn is_success(&self) -> bool {
        matches!(self, DrainOutcome::Empty | DrainOutcome::Applied(_))
    }

    /// `false` for the no-op outcomes `Offline` and `Busy`
    pub fn was_attempted(&self) -> bool {
        !matches!(self, DrainOutcome::Offline | DrainOutcome::Busy)
    }

    /// Queue item the outcome refers to
    pub fn item(&self) -> Option<&QueueItem> {
        match self {
            DrainOutcome::Applied(item)
            | DrainOutcome::Exhausted(item)
            | DrainOutcome::Failed { item, .. } => Some(item),
            DrainOutcome::Offline | DrainOutcome::Busy | DrainOutcome::Empty => None,
        }
    }
}

/// Result of draining until empty or the first failure
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Items applied during this run
    pub applied: usize,
    /// Outcome that ended the run
    pub outcome: DrainOutcome,
}

impl SyncReport {
    /// The queue was emptied without failures
    pub fn is_complete(&self) -> bool {
        self.outcome == DrainOutcome::Empty
    }
}

/// Snapshot for "syncing..." indicators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub drain_state: DrainState,
    pub pending_operations: u64,
    pub metrics: MetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_flag_single_flight() {
        let flag = DrainFlag::default();
        assert_eq!(flag.state(), DrainState::Idle);

        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert_eq!(flag.state(), DrainState::Draining);
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert_eq!(flag.state(), DrainState::Idle);
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_outcome_classification() {
        assert!(DrainOutcome::Empty.is_success());
        assert!(!DrainOutcome::Offline.is_success());
        assert!(!DrainOutcome::Offline.was_attempted());
        assert!(!DrainOutcome::Busy.was_attempted());
        assert!(DrainOutcome::Empty.was_attempted());
    }
}
