//! Submission boundary: accepts scheduler requests and fans them out into
//! independent task records.
//!
//! A batch request is split into one record per task ID so retry and
//! backoff state stay isolated per task; one task's failure never blocks
//! its batch siblings. Batch acceptance is not atomic: callers receive a
//! per-task report and must correlate by task ID.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use strand_core::{JobId, SchedulerId, TaskDefinitionId, TaskId};

use crate::clients::{PerformerSelector, TaskSigner};
use crate::engine::StreamEngine;
use crate::error::{Error, Result};
use crate::index::TaskLocation;
use crate::payload::{TargetData, TriggerData};
use crate::record::{PerformerAssignment, TaskRecord};
use crate::stream::TaskStream;

/// A task-submission request from a scheduler.
///
/// Carries one or many task IDs with index-matched target and trigger
/// rows.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// The originating scheduled job.
    pub job_id: JobId,
    /// Task-definition kind the job was registered under.
    pub task_definition_id: TaskDefinitionId,
    /// Tasks being submitted.
    pub task_ids: Vec<TaskId>,
    /// Execution targets, matched index-wise to `task_ids`.
    pub target_data: Vec<TargetData>,
    /// Trigger context, matched index-wise to `task_ids`.
    pub trigger_data: Vec<TriggerData>,
    /// Scheduler submitting the request.
    pub scheduler_id: SchedulerId,
    /// Free-form source tag for tracing the submission path.
    pub source: String,
}

impl SubmissionRequest {
    /// Validates the request shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubmission`] for an empty request or
    /// mismatched row counts.
    pub fn validate(&self) -> Result<()> {
        if self.task_ids.is_empty() {
            return Err(Error::InvalidSubmission {
                message: "request carries no task IDs".into(),
            });
        }
        if self.task_ids.len() != self.target_data.len()
            || self.task_ids.len() != self.trigger_data.len()
        {
            return Err(Error::InvalidSubmission {
                message: format!(
                    "row counts diverge: {} task IDs, {} targets, {} triggers",
                    self.task_ids.len(),
                    self.target_data.len(),
                    self.trigger_data.len()
                ),
            });
        }
        Ok(())
    }
}

/// One accepted task and the performer it was assigned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTask {
    /// The accepted task.
    pub task_id: TaskId,
    /// Performer the task will be delivered to.
    pub performer: PerformerAssignment,
}

/// One rejected task and the reason.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedTask {
    /// The rejected task.
    pub task_id: TaskId,
    /// Why the task was rejected.
    pub reason: String,
}

/// Per-task outcome of a submission; batches are never atomic.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    /// Tasks accepted for enqueue, with their performer assignments.
    pub accepted: Vec<AcceptedTask>,
    /// Tasks rejected at the submission boundary.
    pub rejected: Vec<RejectedTask>,
}

impl SubmissionReport {
    /// Whether every task in the request was accepted.
    #[must_use]
    pub fn is_fully_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Batch statistics snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Records buffered for the next flush.
    pub buffered: usize,
    /// Records flushed to the Ready stream so far.
    pub flushed_records: u64,
    /// Flush operations performed.
    pub flushes: u64,
    /// Records that failed to enqueue during a flush.
    pub enqueue_failures: u64,
}

#[derive(Debug, Default)]
struct BatcherState {
    buffer: Vec<TaskRecord>,
    flushed_records: u64,
    flushes: u64,
    enqueue_failures: u64,
}

/// Accumulates signed records and releases them in batches.
///
/// The single mutex guards both the buffer and the statistics; critical
/// sections are push/swap/count only.
#[derive(Debug)]
pub struct TaskBatcher {
    state: Mutex<BatcherState>,
    batch_size: usize,
}

impl TaskBatcher {
    /// Creates a batcher that signals a flush at `batch_size` records.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            state: Mutex::new(BatcherState::default()),
            batch_size: batch_size.max(1),
        }
    }

    /// Buffers a record; returns `true` when the buffer reached the batch
    /// size and should be flushed now.
    pub fn push(&self, record: TaskRecord) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.buffer.push(record);
        state.buffer.len() >= self.batch_size
    }

    /// Takes the buffered records, leaving the buffer empty.
    #[must_use]
    pub fn take_batch(&self) -> Vec<TaskRecord> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::take(&mut state.buffer)
    }

    /// Records the outcome of one flush.
    pub fn record_flush(&self, flushed: usize, failures: usize) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.flushes += 1;
        state.flushed_records += flushed as u64;
        state.enqueue_failures += failures as u64;
    }

    /// Returns a statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        BatchStats {
            buffered: state.buffer.len(),
            flushed_records: state.flushed_records,
            flushes: state.flushes,
            enqueue_failures: state.enqueue_failures,
        }
    }
}

/// The submission service: fan-out, performer selection, signing, and
/// batched enqueue into the Ready stream.
pub struct Submitter {
    engine: Arc<StreamEngine>,
    selector: Arc<dyn PerformerSelector>,
    signer: Arc<dyn TaskSigner>,
    batcher: TaskBatcher,
}

impl Submitter {
    /// Creates a submitter over the engine and its collaborators.
    #[must_use]
    pub fn new(
        engine: Arc<StreamEngine>,
        selector: Arc<dyn PerformerSelector>,
        signer: Arc<dyn TaskSigner>,
    ) -> Self {
        let batcher = TaskBatcher::new(engine.config().batch_size);
        Self {
            engine,
            selector,
            signer,
            batcher,
        }
    }

    /// Accepts a submission request.
    ///
    /// Fan-out isolates each task ID into its own record with
    /// `retry_count = 0`. Per record: boundary validation, performer
    /// selection, and signing run synchronously and reject just that task
    /// on failure; accepted records are buffered and flushed to the Ready
    /// stream in batches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubmission`] when the request shape itself
    /// is invalid; per-task failures are reported, not returned.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReport> {
        request.validate()?;
        info!(
            job_id = %request.job_id,
            scheduler_id = %request.scheduler_id,
            source = %request.source,
            tasks = request.task_ids.len(),
            "received task submission"
        );

        let mut report = SubmissionReport::default();
        let mut flush_due = false;

        for ((task_id, target), trigger) in request
            .task_ids
            .iter()
            .zip(request.target_data.iter())
            .zip(request.trigger_data.iter())
        {
            match self
                .prepare_record(&request, *task_id, target.clone(), trigger.clone())
                .await
            {
                Ok((record, performer)) => {
                    flush_due |= self.batcher.push(record);
                    self.engine.metrics().record_submission(true);
                    report.accepted.push(AcceptedTask {
                        task_id: *task_id,
                        performer,
                    });
                }
                Err(e) => {
                    self.engine.metrics().record_submission(false);
                    warn!(task_id = %task_id, error = %e, "task rejected at submission");
                    report.rejected.push(RejectedTask {
                        task_id: *task_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.engine
            .metrics()
            .set_batch_depth(self.batcher.stats().buffered);
        if flush_due {
            self.flush().await;
        }

        Ok(report)
    }

    /// Builds one signed, performer-assigned record for a single task.
    async fn prepare_record(
        &self,
        request: &SubmissionRequest,
        task_id: TaskId,
        target: TargetData,
        trigger: TriggerData,
    ) -> Result<(TaskRecord, PerformerAssignment)> {
        target.validate()?;
        trigger.validate()?;

        let mut record = TaskRecord::new(
            request.job_id,
            request.task_definition_id,
            task_id,
            target,
            trigger,
            request.scheduler_id,
            request.source.clone(),
        );

        let performer = self.selector.select_performer(&record).await?;
        debug!(
            task_id = %task_id,
            performer_id = %performer.performer_id,
            "performer assigned"
        );
        record.performer = Some(performer.clone());

        let signature = self
            .signer
            .sign(&record.signing_payload()?)
            .map_err(|e| Error::Signing {
                task_id,
                message: e.to_string(),
            })?;
        record.manager_signature = Some(signature);
        Ok((record, performer))
    }

    /// Flushes buffered records into the Ready stream.
    ///
    /// Append failures are logged per task and counted; remaining records
    /// in the batch still flush. The records lost here surface through the
    /// enqueue-failure counter and logs, matching the non-atomic batch
    /// contract.
    pub async fn flush(&self) {
        let batch = self.batcher.take_batch();
        if batch.is_empty() {
            return;
        }
        debug!(batch_size = batch.len(), "flushing submission batch");

        let mut flushed = 0usize;
        let mut failures = 0usize;
        for record in batch {
            match self.engine.append_record(TaskStream::Ready, &record).await {
                Ok(message_id) => {
                    flushed += 1;
                    if let Some(task_id) = record.primary_task_id() {
                        self.engine.index().update(
                            task_id,
                            TaskLocation {
                                stream: TaskStream::Ready,
                                message_id,
                                record: record.clone(),
                            },
                        );
                    }
                }
                Err(e) => {
                    failures += 1;
                    error!(
                        task_id = ?record.primary_task_id(),
                        error = %e,
                        "failed to enqueue task to ready stream"
                    );
                }
            }
        }
        self.batcher.record_flush(flushed, failures);
        self.engine
            .metrics()
            .set_batch_depth(self.batcher.stats().buffered);
    }

    /// Returns batch statistics.
    #[must_use]
    pub fn batch_stats(&self) -> BatchStats {
        self.batcher.stats()
    }

    /// The engine configuration, for worker scheduling.
    pub(crate) fn config(&self) -> &crate::config::EngineConfig {
        self.engine.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(task_id: i64) -> TaskRecord {
        TaskRecord::new(
            JobId::new(1),
            TaskDefinitionId::new(1),
            TaskId::new(task_id),
            TargetData {
                chain_id: "1".into(),
                contract_address: "0xabc".into(),
                function: "run()".into(),
                arguments: vec![],
                dynamic_arguments_url: None,
                expires_at: None,
            },
            TriggerData::Time {
                interval_seconds: 60,
                cron_expression: None,
                next_execution_at: Utc::now(),
            },
            SchedulerId::new(1),
            "test",
        )
    }

    #[test]
    fn batcher_signals_flush_at_batch_size() {
        let batcher = TaskBatcher::new(2);
        assert!(!batcher.push(record(1)));
        assert!(batcher.push(record(2)));
        assert_eq!(batcher.stats().buffered, 2);

        let batch = batcher.take_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batcher.stats().buffered, 0);
    }

    #[test]
    fn batcher_tracks_flush_outcomes() {
        let batcher = TaskBatcher::new(10);
        batcher.record_flush(3, 1);
        batcher.record_flush(2, 0);
        let stats = batcher.stats();
        assert_eq!(stats.flushes, 2);
        assert_eq!(stats.flushed_records, 5);
        assert_eq!(stats.enqueue_failures, 1);
    }

    #[test]
    fn mismatched_rows_fail_validation() {
        let request = SubmissionRequest {
            job_id: JobId::new(1),
            task_definition_id: TaskDefinitionId::new(1),
            task_ids: vec![TaskId::new(1), TaskId::new(2)],
            target_data: vec![],
            trigger_data: vec![],
            scheduler_id: SchedulerId::new(1),
            source: "test".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn empty_requests_fail_validation() {
        let request = SubmissionRequest {
            job_id: JobId::new(1),
            task_definition_id: TaskDefinitionId::new(1),
            task_ids: vec![],
            target_data: vec![],
            trigger_data: vec![],
            scheduler_id: SchedulerId::new(1),
            source: "test".into(),
        };
        assert!(request.validate().is_err());
    }
}
