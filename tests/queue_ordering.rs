//! Property-based tests for drain ordering
//!
//! Whatever order mutations are enqueued in, and however drains interleave with
//! transient remote failures, the backend sees successful mutations in
//! `created_at` order.

mod common;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use roofsync::shared::{RemoteError, SyncAction};
use roofsync::sync::DrainOutcome;
use serde_json::json;

use common::Harness;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build test runtime")
}

fn table_for(index: usize) -> &'static str {
    if index % 2 == 0 {
        "inspections"
    } else {
        "clients"
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_applied_in_created_at_order(
        offsets in prop::collection::hash_set(0i64..10_000, 1..12),
        failures in prop::collection::vec(any::<bool>(), 0..24),
    ) {
        let offsets: Vec<i64> = offsets.into_iter().collect();

        let applied = runtime().block_on(async {
            let harness = Harness::with_max_attempts(true, 100).await;

            // Enqueue in hash-set order, which is unrelated to time order.
            for (index, offset) in offsets.iter().enumerate() {
                let created_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap()
                    + chrono::Duration::milliseconds(*offset);
                harness
                    .db
                    .enqueue_at(
                        table_for(index),
                        SyncAction::Create,
                        json!({"id": format!("r{}", offset)}),
                        created_at,
                    )
                    .await
                    .unwrap();
            }

            for fail in &failures {
                if *fail {
                    harness.remote.fail_next(RemoteError::network("flaky"));
                }
                if harness.engine.process_sync_queue().await.unwrap() == DrainOutcome::Empty {
                    break;
                }
            }
            harness.engine.start_sync().await.unwrap();

            assert_eq!(harness.db.pending_count().await.unwrap(), 0);
            harness.remote.record_ids()
        });

        let mut expected = offsets;
        expected.sort_unstable();
        let expected: Vec<String> = expected.iter().map(|offset| format!("r{}", offset)).collect();

        // Failed calls repeat an id; collapse them before comparing.
        let mut seen = applied;
        seen.dedup();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn test_same_instant_keeps_enqueue_order(count in 2usize..8) {
        let applied = runtime().block_on(async {
            let harness = Harness::new(true).await;
            let instant = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

            for index in 0..count {
                harness
                    .db
                    .enqueue_at(
                        table_for(index),
                        SyncAction::Update,
                        json!({"id": format!("r{}", index)}),
                        instant,
                    )
                    .await
                    .unwrap();
            }
            harness.engine.start_sync().await.unwrap();
            harness.remote.record_ids()
        });

        let expected: Vec<String> = (0..count).map(|index| format!("r{}", index)).collect();
        prop_assert_eq!(applied, expected);
    }
}
