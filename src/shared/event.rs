//! Sync Event Bus
//!
//! Publish/subscribe channel between the sync machinery and its observers
//! (status badges, banners, dashboards).
//!
//! Delivery is synchronous and in-process. Events are not stored: a listener that
//! subscribes after an event was emitted never sees it.
//!
//! Listeners are kept as `Arc<dyn Fn>` behind a `parking_lot::Mutex`. `emit` takes a
//! snapshot of the list and releases the lock before calling anyone, so a listener
//! may subscribe or unsubscribe from inside its callback.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::shared::record::QueueItem;

/// Handle returned by [`EventBus::subscribe`]
pub type SubscriptionId = u64;

type Listener = dyn Fn(&SyncEvent) + Send + Sync;

/// Named event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Online,
    Offline,
    SyncSuccess,
    SyncError,
}

/// Why a queue item failed to sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum SyncErrorReason {
    /// The attempt cap was reached; the item was dropped
    TooManyAttempts,
    /// The backend call failed; the item stays queued
    Remote(String),
}

impl fmt::Display for SyncErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncErrorReason::TooManyAttempts => f.write_str("too many attempts"),
            SyncErrorReason::Remote(detail) => f.write_str(detail),
        }
    }
}

/// Event emitted by the connectivity monitor and the sync engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    Online,
    Offline,
    SyncSuccess {
        item: QueueItem,
    },
    SyncError {
        item: QueueItem,
        reason: SyncErrorReason,
    },
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::Online => EventKind::Online,
            SyncEvent::Offline => EventKind::Offline,
            SyncEvent::SyncSuccess { .. } => EventKind::SyncSuccess,
            SyncEvent::SyncError { .. } => EventKind::SyncError,
        }
    }

    /// Queue item the event is about, if any
    pub fn item(&self) -> Option<&QueueItem> {
        match self {
            SyncEvent::SyncSuccess { item } | SyncEvent::SyncError { item, .. } => Some(item),
            SyncEvent::Online | SyncEvent::Offline => None,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    listener: Arc<Listener>,
}

/// Typed synchronous event bus
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Listen to one kind of event
    pub fn subscribe(
        &self,
        kind: EventKind,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.insert(Some(kind), Arc::new(listener))
    }

    /// Listen to every event
    pub fn subscribe_all(
        &self,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.insert(None, Arc::new(listener))
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.lock().retain(|sub| sub.id != id);
    }

    /// Deliver `event` to every matching listener
    pub fn emit(&self, event: &SyncEvent) {
        let kind = event.kind();
        let snapshot: Vec<Arc<Listener>> = {
            let guard = self.subscriptions.lock();
            guard
                .iter()
                .filter(|sub| sub.kind.map_or(true, |k| k == kind))
                .map(|sub| Arc::clone(&sub.listener))
                .collect()
        };

        tracing::trace!("[EVENTS] {:?} -> {} listener(s)", kind, snapshot.len());
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn insert(&self, kind: Option<EventKind>, listener: Arc<Listener>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().push(Subscription { id, kind, listener });
        id
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
