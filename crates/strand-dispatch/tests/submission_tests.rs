//! Submission boundary tests: fan-out, partial batch failure, batching.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{records_in, request_for, Harness, SendScript};
use strand_dispatch::stream::TaskStream;

#[tokio::test]
async fn batch_fans_out_into_independent_ready_records() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();

    let report = manager.submit(request_for(&[1, 2, 3])).await.unwrap();
    assert!(report.is_fully_accepted());
    assert_eq!(report.accepted.len(), 3);
    for accepted in &report.accepted {
        assert_eq!(accepted.performer.address, "performer-3.example");
    }

    let records = records_in(&harness.store, TaskStream::Ready);
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.task_ids.len(), 1);
        assert_eq!(record.target_data.len(), 1);
        assert_eq!(record.retry_count, 0);
        assert!(record.manager_signature.is_some());
        assert!(record.performer.is_some());
    }

    // Each record carries its own target row.
    let mut ids: Vec<i64> = records
        .iter()
        .map(|r| r.primary_task_id().unwrap().value())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn signing_failure_rejects_only_that_task() {
    // Scenario: batch of 3 where task 2's signing fails.
    let harness = Harness::new(SendScript::AlwaysOk).with_failing_signer(vec![2]);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();

    let report = manager.submit(request_for(&[1, 2, 3])).await.unwrap();
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].task_id.value(), 2);
    assert!(report.rejected[0].reason.contains("signing"));

    let mut ids: Vec<i64> = records_in(&harness.store, TaskStream::Ready)
        .iter()
        .map(|r| r.primary_task_id().unwrap().value())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn single_task_requests_enqueue_one_record() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();

    let report = manager.submit(request_for(&[42])).await.unwrap();
    assert!(report.is_fully_accepted());
    assert_eq!(report.accepted.len(), 1);

    let records = records_in(&harness.store, TaskStream::Ready);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].primary_task_id().unwrap().value(), 42);
    assert_eq!(records[0].source, "time-scheduler");
}

#[tokio::test]
async fn malformed_requests_are_rejected_whole() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();

    let mut request = request_for(&[1, 2]);
    request.target_data.pop();
    let err = manager.submit(request).await.unwrap_err();
    assert!(err.to_string().contains("row counts diverge"));

    assert!(records_in(&harness.store, TaskStream::Ready).is_empty());
}

#[tokio::test]
async fn invalid_trigger_rejects_only_that_task() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let manager = harness.manager(common::test_config());
    manager.initialize().await.unwrap();

    let mut request = request_for(&[1, 2]);
    request.trigger_data[1] = strand_dispatch::payload::TriggerData::Condition {
        condition_type: "range".into(),
        source_url: "https://example.com".into(),
        upper_limit: 1.0,
        lower_limit: 5.0,
        satisfied_value: None,
    };

    let report = manager.submit(request).await.unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].task_id.value(), 2);
}

#[tokio::test]
async fn batcher_buffers_until_size_threshold() {
    let harness = Harness::new(SendScript::AlwaysOk);
    let config = strand_dispatch::config::EngineConfig {
        batch_size: 10,
        ..common::test_config()
    };
    let manager = harness.manager(config);
    manager.initialize().await.unwrap();

    // Below the threshold nothing reaches the stream without a flush tick.
    manager.submit(request_for(&[1, 2])).await.unwrap();
    assert!(records_in(&harness.store, TaskStream::Ready).is_empty());
    assert_eq!(manager.batch_stats().buffered, 2);

    // Crossing the threshold flushes everything buffered.
    manager
        .submit(request_for(&[3, 4, 5, 6, 7, 8, 9, 10]))
        .await
        .unwrap();
    assert_eq!(records_in(&harness.store, TaskStream::Ready).len(), 10);
    let stats = manager.batch_stats();
    assert_eq!(stats.buffered, 0);
    assert_eq!(stats.flushed_records, 10);
    assert_eq!(stats.flushes, 1);
}
