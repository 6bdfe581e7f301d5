//! Engine fixture
//!
//! Builds a [`SyncEngine`] over an in-memory database and a [`FakeRemote`], with a
//! listener capturing every emitted event.

use parking_lot::Mutex;
use roofsync::local_db::LocalDatabase;
use roofsync::offline::RecordRepository;
use roofsync::shared::{EventBus, EventKind, SyncEvent};
use roofsync::sync::{ConnectivityMonitor, SyncEngine};
use std::sync::Arc;
use std::time::Duration;

use super::FakeRemote;

pub struct Harness {
    pub db: LocalDatabase,
    pub remote: Arc<FakeRemote>,
    pub events: Arc<EventBus>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub engine: Arc<SyncEngine>,
    seen: Arc<Mutex<Vec<SyncEvent>>>,
}

impl Harness {
    pub async fn new(online: bool) -> Self {
        Self::with_max_attempts(online, 5).await
    }

    pub async fn with_max_attempts(online: bool, max_attempts: u32) -> Self {
        let db = LocalDatabase::open_in_memory()
            .await
            .expect("Failed to open in-memory database");
        let remote = Arc::new(FakeRemote::new());
        let events = Arc::new(EventBus::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe_all(move |event| sink.lock().push(event.clone()));

        let connectivity = Arc::new(ConnectivityMonitor::new(online, Arc::clone(&events)));
        let engine = Arc::new(
            SyncEngine::new(
                db.clone(),
                remote.clone(),
                Arc::clone(&connectivity),
                Arc::clone(&events),
            )
            .with_max_attempts(max_attempts),
        );

        Self {
            db,
            remote,
            events,
            connectivity,
            engine,
            seen,
        }
    }

    pub fn repository(&self) -> RecordRepository {
        RecordRepository::new(self.db.clone(), Arc::clone(&self.connectivity))
    }

    /// Every event emitted so far
    pub fn events_seen(&self) -> Vec<SyncEvent> {
        self.seen.lock().clone()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<SyncEvent> {
        self.seen
            .lock()
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn clear_events(&self) {
        self.seen.lock().clear();
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
