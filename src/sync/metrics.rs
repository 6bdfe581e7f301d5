//! # Sync Metrics
//!
//! Counters describing what the engine has done since start-up.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub items_applied: u64,
    pub items_failed: u64,
    pub items_exhausted: u64,
    pub remote_calls: u64,
    pub average_call_duration: Duration,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    total_call_nanos: u128,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, call_duration: Duration) {
        self.record_call(call_duration);
        self.items_applied += 1;
        self.last_success_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self, call_duration: Duration, error: &str) {
        self.record_call(call_duration);
        self.items_failed += 1;
        self.last_error = Some(error.to_string());
    }

    pub fn record_exhausted(&mut self) {
        self.items_exhausted += 1;
    }

    /// Share of remote calls that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.remote_calls == 0 {
            0.0
        } else {
            self.items_applied as f64 / self.remote_calls as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_applied: self.items_applied,
            items_failed: self.items_failed,
            items_exhausted: self.items_exhausted,
            remote_calls: self.remote_calls,
            average_call_ms: self.average_call_duration.as_millis() as u64,
            last_success_at: self.last_success_at,
            last_error: self.last_error.clone(),
        }
    }

    fn record_call(&mut self, duration: Duration) {
        self.remote_calls = self.remote_calls.saturating_add(1);
        self.total_call_nanos = self.total_call_nanos.saturating_add(duration.as_nanos());
        let average = self.total_call_nanos / u128::from(self.remote_calls);
        self.average_call_duration = Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX));
    }
}

/// Copy of the counters for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub items_applied: u64,
    pub items_failed: u64,
    pub items_exhausted: u64,
    pub remote_calls: u64,
    pub average_call_ms: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
