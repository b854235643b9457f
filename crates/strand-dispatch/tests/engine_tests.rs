//! Engine-level lifecycle tests: moves, retry policy, completion,
//! quarantine.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{performer_result, records_in, request_for, Harness, SendScript};
use strand_core::TaskId;
use strand_dispatch::config::EngineConfig;
use strand_dispatch::engine::RetryOutcome;
use strand_dispatch::error::Error;
use strand_dispatch::store::{InMemoryStreamStore, StreamStore};
use strand_dispatch::stream::{groups, TaskStream};

#[tokio::test]
async fn move_to_processing_leaves_no_live_ready_copy() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();
    manager.submit(request_for(&[1])).await.unwrap();

    let engine = manager.engine();
    let tasks = engine
        .read_records(TaskStream::Ready, groups::TASK_PROCESSORS, "t1", 10)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);

    let moved = engine
        .move_to_processing(tasks[0].record.clone(), &tasks[0].message_id)
        .await
        .unwrap();
    assert!(moved.processing_started_at.is_some());

    // Eventual exclusivity: the Ready copy is acknowledged, the Processing
    // copy is live.
    assert!(harness
        .store
        .unacked(TaskStream::Ready.name(), groups::TASK_PROCESSORS)
        .unwrap()
        .is_empty());
    assert_eq!(records_in(&harness.store, TaskStream::Processing).len(), 1);
}

#[tokio::test]
async fn schedule_retry_stamps_a_future_scheduled_for() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();
    manager.submit(request_for(&[1])).await.unwrap();

    let engine = manager.engine();
    let tasks = engine
        .read_records(TaskStream::Ready, groups::TASK_PROCESSORS, "t1", 10)
        .await
        .unwrap();
    let moved = engine
        .move_to_processing(tasks[0].record.clone(), &tasks[0].message_id)
        .await
        .unwrap();

    let before = Utc::now();
    let outcome = engine.schedule_retry(moved, "connection refused").await.unwrap();
    let RetryOutcome::Retried { scheduled_for } = outcome else {
        panic!("expected a retry, got {outcome:?}");
    };
    assert!(scheduled_for > before);

    let retry_records = records_in(&harness.store, TaskStream::Retry);
    assert_eq!(retry_records.len(), 1);
    assert_eq!(retry_records[0].retry_count, 1);
    assert_eq!(retry_records[0].last_error.as_deref(), Some("connection refused"));
    assert!(retry_records[0].scheduled_for.is_some());

    // The Processing copy was acknowledged as part of the move.
    assert!(harness
        .store
        .unacked(TaskStream::Processing.name(), groups::TIMEOUT_CHECKERS)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn retry_ceiling_moves_the_task_to_failed() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();
    manager.submit(request_for(&[1])).await.unwrap();

    let engine = manager.engine();
    let tasks = engine
        .read_records(TaskStream::Ready, groups::TASK_PROCESSORS, "t1", 10)
        .await
        .unwrap();
    let mut record = engine
        .move_to_processing(tasks[0].record.clone(), &tasks[0].message_id)
        .await
        .unwrap();

    // Walk the record through every failure until the ceiling.
    for attempt in 1..=3u32 {
        let outcome = engine
            .schedule_retry(record.clone(), "connection refused")
            .await
            .unwrap();
        record.retry_count = attempt;
        if attempt < 3 {
            assert!(matches!(outcome, RetryOutcome::Retried { .. }));
        } else {
            assert_eq!(outcome, RetryOutcome::Exhausted);
        }
    }

    let failed = records_in(&harness.store, TaskStream::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 3);

    // Terminal: nothing live remains in Ready or Retry for this task.
    assert!(harness
        .store
        .unacked(TaskStream::Ready.name(), groups::TASK_PROCESSORS)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn mark_completed_finalizes_and_persists() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();
    manager.submit(request_for(&[9])).await.unwrap();

    let engine = manager.engine();
    let tasks = engine
        .read_records(TaskStream::Ready, groups::TASK_PROCESSORS, "t1", 10)
        .await
        .unwrap();
    engine
        .move_to_processing(tasks[0].record.clone(), &tasks[0].message_id)
        .await
        .unwrap();

    manager
        .mark_completed(TaskId::new(9), performer_result())
        .await
        .unwrap();

    let completed = records_in(&harness.store, TaskStream::Completed);
    assert_eq!(completed.len(), 1);
    assert!(completed[0].completed_at.is_some());

    // Processing copy is acknowledged and the execution row recorded.
    assert!(harness
        .store
        .unacked(TaskStream::Processing.name(), groups::TIMEOUT_CHECKERS)
        .unwrap()
        .is_empty());
    let rows = harness.persistence.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, TaskId::new(9));
}

#[tokio::test]
async fn mark_completed_for_unknown_task_errors() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();

    let err = manager
        .mark_completed(TaskId::new(404), performer_result())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskNotFound { .. }));
}

#[tokio::test]
async fn persistence_failure_does_not_roll_back_completion() {
    let mut harness = Harness::new(SendScript::AlwaysOk);
    harness.persistence = Arc::new(common::RecordingExecutionStore {
        rows: std::sync::Mutex::new(Vec::new()),
        fail: true,
    });
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();
    manager.submit(request_for(&[5])).await.unwrap();

    let engine = manager.engine();
    let tasks = engine
        .read_records(TaskStream::Ready, groups::TASK_PROCESSORS, "t1", 10)
        .await
        .unwrap();
    engine
        .move_to_processing(tasks[0].record.clone(), &tasks[0].message_id)
        .await
        .unwrap();

    // The completed stream stays authoritative even when the projection
    // write fails.
    manager
        .mark_completed(TaskId::new(5), performer_result())
        .await
        .unwrap();
    assert_eq!(records_in(&harness.store, TaskStream::Completed).len(), 1);
}

#[tokio::test]
async fn poison_messages_are_quarantined_after_the_ceiling() {
    let harness = Harness::new(SendScript::AlwaysOk)
        .with_store(InMemoryStreamStore::with_redelivery_after(Duration::ZERO));
    let config = EngineConfig {
        quarantine_ceiling: 3,
        ..common::test_config()
    };
    let manager = harness.manager(config);
    manager.initialize().await.unwrap();

    harness
        .store
        .append(TaskStream::Ready.name(), 100, b"{not a record")
        .await
        .unwrap();

    let engine = manager.engine();
    for _ in 0..3 {
        let tasks = engine
            .read_records(TaskStream::Ready, groups::TASK_PROCESSORS, "t1", 10)
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }

    // The raw payload is preserved in Failed and the poison message can no
    // longer block the group.
    let failed = harness.store.snapshot(TaskStream::Failed.name()).unwrap();
    assert_eq!(failed.len(), 1);
    let envelope: serde_json::Value = serde_json::from_slice(&failed[0].payload).unwrap();
    assert_eq!(envelope["sourceStream"], "tasks:ready");
    assert!(envelope["payload"].as_str().unwrap().contains("not a record"));

    let after = engine
        .read_records(TaskStream::Ready, groups::TASK_PROCESSORS, "t1", 10)
        .await
        .unwrap();
    assert!(after.is_empty());
    assert!(harness
        .store
        .unacked(TaskStream::Ready.name(), groups::TASK_PROCESSORS)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn stream_info_reports_lengths_and_groups() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();
    manager.submit(request_for(&[1, 2])).await.unwrap();

    let info = manager.stream_info().await;
    let ready = info.lengths.iter().find(|l| l.stream == "ready").unwrap();
    assert_eq!(ready.length, 2);
    assert!(info.consumer_groups >= 1);
    assert_eq!(info.max_retry_attempts, 3);
}
