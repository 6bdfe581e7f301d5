//! In-process remote backend for engine tests
//!
//! Records every call and fails, succeeds or hangs as scripted.

use async_trait::async_trait;
use parking_lot::Mutex;
use roofsync::remote::RemoteBackend;
use roofsync::shared::{RemoteError, SyncAction};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// One call received by [`FakeRemote`]
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub action: SyncAction,
    pub table: String,
    pub record_id: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    scripted_failures: Mutex<VecDeque<RemoteError>>,
    fail_always: AtomicBool,
    hang: AtomicBool,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`; queued failures are used in order
    pub fn fail_next(&self, error: RemoteError) {
        self.scripted_failures.lock().push_back(error);
    }

    /// Fail every call until cleared
    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Never complete calls until cleared
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Record ids in call order
    pub fn record_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|call| {
                call.record_id
                    .clone()
                    .or_else(|| call.data.as_ref().and_then(|d| d["id"].as_str().map(String::from)))
                    .unwrap_or_default()
            })
            .collect()
    }

    async fn respond(&self, call: RemoteCall) -> Result<(), RemoteError> {
        self.calls.lock().push(call);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Err(error);
        }
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(RemoteError::network("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for FakeRemote {
    async fn insert(&self, table: &str, data: &Value) -> Result<(), RemoteError> {
        self.respond(RemoteCall {
            action: SyncAction::Create,
            table: table.to_string(),
            record_id: None,
            data: Some(data.clone()),
        })
        .await
    }

    async fn update(&self, table: &str, id: &str, data: &Value) -> Result<(), RemoteError> {
        self.respond(RemoteCall {
            action: SyncAction::Update,
            table: table.to_string(),
            record_id: Some(id.to_string()),
            data: Some(data.clone()),
        })
        .await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.respond(RemoteCall {
            action: SyncAction::Delete,
            table: table.to_string(),
            record_id: Some(id.to_string()),
            data: None,
        })
        .await
    }
}
