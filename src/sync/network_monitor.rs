//! # Connectivity Monitor
//!
//! Holds the last known online/offline state reported by the platform and turns
//! changes into `Online`/`Offline` events.
//!
//! - `is_online` never blocks or performs I/O.
//! - Events are edge-triggered: reporting the current state again emits nothing.
//! - No probing of the backend happens here. Online means the platform says there
//!   is a network, not that the backend answers.

use std::sync::Arc;
use tokio::sync::watch;

use crate::shared::event::{EventBus, SyncEvent};

/// Online/offline state with change notification
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    events: Arc<EventBus>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool, events: Arc<EventBus>) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state, events }
    }

    /// Last known state
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Report the platform's current state
    ///
    /// Returns `true` when this was a transition. The matching event is emitted
    /// before returning.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            tracing::info!("[NETWORK] Now {}", if online { "online" } else { "offline" });
            let event = if online { SyncEvent::Online } else { SyncEvent::Offline };
            self.events.emit(&event);
        }
        changed
    }

    /// Receiver that wakes on every transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
