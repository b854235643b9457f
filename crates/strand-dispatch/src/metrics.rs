//! Observability metrics for the dispatch engine.
//!
//! This module provides Prometheus-compatible metrics for monitoring task
//! flow through the streams. Metrics are designed to support:
//!
//! - **Alerting**: retry-exhaustion and quarantine rates
//! - **Dashboards**: per-stream depth and enqueue/read outcomes
//! - **Debugging**: correlating dispatch outcomes with logs
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strand_dispatch_tasks_enqueued_total` | Counter | `stream`, `result` | Stream append outcomes |
//! | `strand_dispatch_tasks_read_total` | Counter | `stream`, `result` | Group read outcomes |
//! | `strand_dispatch_stream_length` | Gauge | `stream` | Live entries per stream |
//! | `strand_dispatch_sends_total` | Counter | `result` | Performer send outcomes |
//! | `strand_dispatch_retries_total` | Counter | - | Tasks scheduled for retry |
//! | `strand_dispatch_retries_exhausted_total` | Counter | - | Tasks moved to Failed at the ceiling |
//! | `strand_dispatch_quarantined_total` | Counter | - | Poison messages moved to Failed |
//! | `strand_dispatch_submissions_total` | Counter | `result` | Per-task submission outcomes |
//! | `strand_dispatch_consumer_groups` | Gauge | - | Registered consumer groups |
//! | `strand_dispatch_batch_depth` | Gauge | - | Records buffered for the next flush |
//!
//! ## Integration
//!
//! Metrics are exposed via the `metrics` crate facade; the embedding
//! service installs an exporter (e.g. `metrics-exporter-prometheus`).

use metrics::{counter, gauge};

use crate::stream::TaskStream;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Stream append outcomes.
    pub const TASKS_ENQUEUED_TOTAL: &str = "strand_dispatch_tasks_enqueued_total";
    /// Counter: Group read outcomes.
    pub const TASKS_READ_TOTAL: &str = "strand_dispatch_tasks_read_total";
    /// Gauge: Live entries per stream.
    pub const STREAM_LENGTH: &str = "strand_dispatch_stream_length";
    /// Counter: Performer send outcomes.
    pub const SENDS_TOTAL: &str = "strand_dispatch_sends_total";
    /// Counter: Tasks scheduled for retry.
    pub const RETRIES_TOTAL: &str = "strand_dispatch_retries_total";
    /// Counter: Tasks moved to Failed at the retry ceiling.
    pub const RETRIES_EXHAUSTED_TOTAL: &str = "strand_dispatch_retries_exhausted_total";
    /// Counter: Poison messages quarantined to Failed.
    pub const QUARANTINED_TOTAL: &str = "strand_dispatch_quarantined_total";
    /// Counter: Per-task submission outcomes.
    pub const SUBMISSIONS_TOTAL: &str = "strand_dispatch_submissions_total";
    /// Gauge: Registered consumer groups.
    pub const CONSUMER_GROUPS: &str = "strand_dispatch_consumer_groups";
    /// Gauge: Records buffered for the next batch flush.
    pub const BATCH_DEPTH: &str = "strand_dispatch_batch_depth";
}

/// Label keys used across metrics.
pub mod labels {
    /// Stream label (ready, processing, retry, completed, failed).
    pub const STREAM: &str = "stream";
    /// Outcome label (success, failure, empty, rejected, timeout).
    pub const RESULT: &str = "result";
}

/// High-level interface for recording dispatch metrics.
///
/// Cheap to clone; one instance is injected into the engine and shared by
/// the workers.
#[derive(Debug, Clone, Default)]
pub struct DispatchMetrics {
    _private: (),
}

impl DispatchMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stream append outcome.
    pub fn record_enqueue(&self, stream: TaskStream, success: bool) {
        counter!(
            names::TASKS_ENQUEUED_TOTAL,
            labels::STREAM => stream.label(),
            labels::RESULT => result_label(success),
        )
        .increment(1);
    }

    /// Records a group read outcome.
    pub fn record_read(&self, stream: TaskStream, result: &'static str) {
        counter!(
            names::TASKS_READ_TOTAL,
            labels::STREAM => stream.label(),
            labels::RESULT => result,
        )
        .increment(1);
    }

    /// Publishes the live length of a stream.
    pub fn set_stream_length(&self, stream: TaskStream, length: u64) {
        gauge!(names::STREAM_LENGTH, labels::STREAM => stream.label()).set(length as f64);
    }

    /// Records a performer send outcome.
    pub fn record_send(&self, result: &'static str) {
        counter!(names::SENDS_TOTAL, labels::RESULT => result).increment(1);
    }

    /// Records one task scheduled for retry.
    pub fn record_retry(&self) {
        counter!(names::RETRIES_TOTAL).increment(1);
    }

    /// Records one task moved to Failed at the retry ceiling.
    pub fn record_retry_exhausted(&self) {
        counter!(names::RETRIES_EXHAUSTED_TOTAL).increment(1);
    }

    /// Records one quarantined poison message.
    pub fn record_quarantined(&self) {
        counter!(names::QUARANTINED_TOTAL).increment(1);
    }

    /// Records a per-task submission outcome.
    pub fn record_submission(&self, success: bool) {
        counter!(
            names::SUBMISSIONS_TOTAL,
            labels::RESULT => result_label(success),
        )
        .increment(1);
    }

    /// Publishes the number of registered consumer groups.
    pub fn set_consumer_groups(&self, count: usize) {
        gauge!(names::CONSUMER_GROUPS).set(count as f64);
    }

    /// Publishes the batch buffer depth.
    pub fn set_batch_depth(&self, depth: usize) {
        gauge!(names::BATCH_DEPTH).set(depth as f64);
    }
}

const fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The metrics facade is a no-op without an installed recorder; these
    // tests only assert the recorder surface stays callable.
    #[test]
    fn recorder_methods_do_not_panic_without_an_exporter() {
        let metrics = DispatchMetrics::new();
        metrics.record_enqueue(TaskStream::Ready, true);
        metrics.record_read(TaskStream::Retry, "empty");
        metrics.set_stream_length(TaskStream::Failed, 3);
        metrics.record_send("timeout");
        metrics.record_retry();
        metrics.record_retry_exhausted();
        metrics.record_quarantined();
        metrics.record_submission(false);
        metrics.set_consumer_groups(4);
        metrics.set_batch_depth(2);
    }
}
