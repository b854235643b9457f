//! The stream engine: task lifecycle over the five streams.
//!
//! Every transition follows move-then-acknowledge: the record is durably
//! appended to its destination stream before the source message is acked.
//! A crash between the two steps leaves a duplicate in flight, never a
//! lost task.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use strand_core::TaskId;

use crate::backoff::{RetryDecision, RetryPolicy};
use crate::clients::ExecutionStore;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::index::{TaskIndex, TaskLocation};
use crate::metrics::DispatchMetrics;
use crate::quarantine::{QuarantineLedger, QuarantinedPayload};
use crate::record::{PerformerResult, TaskRecord};
use crate::store::{StreamMessage, StreamStore};
use crate::stream::{descriptors, groups, TaskStream};

/// Outcome of routing a failed task through the retry path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The task was moved to the Retry stream.
    Retried {
        /// Earliest time the retry worker may re-queue it.
        scheduled_for: DateTime<Utc>,
    },
    /// The retry ceiling was reached; the task is in Failed, terminally.
    Exhausted,
}

/// A record delivered from a stream together with its message ID.
#[derive(Debug, Clone)]
pub struct ReadTask {
    /// Store message ID, needed for the acknowledgement.
    pub message_id: String,
    /// The decoded task record.
    pub record: TaskRecord,
}

/// Point-in-time topology snapshot for health endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    /// Live length per stream; `-1` when the store read failed.
    pub lengths: Vec<StreamLength>,
    /// Consumer groups registered by this process.
    pub consumer_groups: usize,
    /// Configured retry ceiling.
    pub max_retry_attempts: u32,
    /// Configured per-append length cap.
    pub stream_max_len: usize,
}

/// Length of one stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamLength {
    /// Stream label.
    pub stream: &'static str,
    /// Live entries, or `-1` when unavailable.
    pub length: i64,
}

/// Owns the stream topology and every task lifecycle transition.
///
/// The engine holds no task state of its own: the store is authoritative,
/// and the only process-local mutable state is the consumer-group
/// registration cache, the task location index, and the quarantine ledger,
/// each behind its own short-section mutex.
pub struct StreamEngine {
    store: Arc<dyn StreamStore>,
    persistence: Arc<dyn ExecutionStore>,
    config: EngineConfig,
    policy: RetryPolicy,
    metrics: DispatchMetrics,
    registered_groups: Mutex<HashSet<String>>,
    index: TaskIndex,
    quarantine: QuarantineLedger,
}

impl StreamEngine {
    /// Creates an engine over the given store and collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn StreamStore>,
        persistence: Arc<dyn ExecutionStore>,
        config: EngineConfig,
        metrics: DispatchMetrics,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        let quarantine = QuarantineLedger::new(config.quarantine_ceiling);
        Self {
            store,
            persistence,
            config,
            policy,
            metrics,
            registered_groups: Mutex::new(HashSet::new()),
            index: TaskIndex::new(),
            quarantine,
        }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Creates all five streams and the primary Ready consumer group.
    ///
    /// Idempotent; creating an existing stream is a no-op. All other
    /// operations assume this has succeeded.
    ///
    /// # Errors
    ///
    /// Returns a store error when the store is unreachable; callers treat
    /// that as fatal.
    pub async fn initialize(&self) -> Result<()> {
        info!("initializing task streams");
        for descriptor in descriptors(&self.config) {
            self.store
                .create_stream_if_not_exists(descriptor.stream.name(), descriptor.ttl)
                .await?;
            debug!(stream = %descriptor.stream, ttl = ?descriptor.ttl, "stream initialized");
        }
        self.register_consumer_group(TaskStream::Ready, groups::TASK_PROCESSORS)
            .await?;
        info!("all task streams initialized");
        Ok(())
    }

    /// Registers a consumer group, memoizing known registrations to avoid
    /// redundant store round-trips.
    ///
    /// # Errors
    ///
    /// Returns a store error if the group cannot be created.
    pub async fn register_consumer_group(&self, stream: TaskStream, group: &str) -> Result<()> {
        let key = format!("{}:{group}", stream.name());
        {
            let registered = self
                .registered_groups
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if registered.contains(&key) {
                return Ok(());
            }
        }

        self.store.create_consumer_group(stream.name(), group).await?;
        info!(stream = %stream, group = group, "consumer group registered");

        let mut registered = self
            .registered_groups
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        registered.insert(key);
        self.metrics.set_consumer_groups(registered.len());
        Ok(())
    }

    /// Appends a record to a stream.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for unencodable records and a store
    /// error for failed appends.
    pub async fn append_record(&self, stream: TaskStream, record: &TaskRecord) -> Result<String> {
        let payload = record.to_payload()?;
        match self
            .store
            .append(stream.name(), self.config.stream_max_len, &payload)
            .await
        {
            Ok(message_id) => {
                self.metrics.record_enqueue(stream, true);
                debug!(
                    stream = %stream,
                    task_id = ?record.primary_task_id(),
                    message_id = %message_id,
                    "record appended"
                );
                Ok(message_id)
            }
            Err(e) => {
                self.metrics.record_enqueue(stream, false);
                error!(
                    stream = %stream,
                    task_id = ?record.primary_task_id(),
                    error = %e,
                    "failed to append record"
                );
                Err(e)
            }
        }
    }

    /// Reads and decodes up to `count` records for a consumer group.
    ///
    /// Malformed payloads are logged, counted against the quarantine
    /// ceiling, and skipped; once a message reaches the ceiling its raw
    /// payload is preserved in the Failed stream and the message is
    /// acknowledged so it can no longer block the group.
    ///
    /// # Errors
    ///
    /// Returns a store error when the read itself fails.
    pub async fn read_records(
        &self,
        stream: TaskStream,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<ReadTask>> {
        self.register_consumer_group(stream, group).await?;

        let messages = self
            .store
            .read_group(
                stream.name(),
                group,
                consumer,
                count,
                self.config.block_timeout,
            )
            .await?;

        if messages.is_empty() {
            self.metrics.record_read(stream, "empty");
            return Ok(Vec::new());
        }
        self.metrics.record_read(stream, "success");

        let mut tasks = Vec::with_capacity(messages.len());
        for message in messages {
            match TaskRecord::from_payload(&message.payload) {
                Ok(record) => tasks.push(ReadTask {
                    message_id: message.id,
                    record,
                }),
                Err(e) => {
                    warn!(
                        stream = %stream,
                        message_id = %message.id,
                        error = %e,
                        "skipping malformed stream payload"
                    );
                    if self.quarantine.record_failure(&message.id) {
                        self.quarantine_message(stream, group, &message).await;
                    }
                }
            }
        }
        Ok(tasks)
    }

    /// Moves a poison message into the Failed stream and acks it.
    async fn quarantine_message(&self, stream: TaskStream, group: &str, message: &StreamMessage) {
        let wrapped = QuarantinedPayload::new(
            stream.name(),
            message.id.clone(),
            &message.payload,
            "decode failure ceiling reached",
        );
        let payload = match serde_json::to_vec(&wrapped) {
            Ok(payload) => payload,
            Err(e) => {
                error!(message_id = %message.id, error = %e, "failed to encode quarantine envelope");
                return;
            }
        };
        if let Err(e) = self
            .store
            .append(TaskStream::Failed.name(), self.config.stream_max_len, &payload)
            .await
        {
            error!(
                message_id = %message.id,
                error = %e,
                "failed to quarantine poison message; leaving it for redelivery"
            );
            return;
        }
        if let Err(e) = self.store.ack(stream.name(), group, &message.id).await {
            warn!(message_id = %message.id, error = %e, "failed to ack quarantined message");
        }
        self.quarantine.forget(&message.id);
        self.metrics.record_quarantined();
        warn!(
            stream = %stream,
            message_id = %message.id,
            "poison message quarantined to failed stream"
        );
    }

    /// Moves a task from Ready into Processing.
    ///
    /// Stamps `processing_started_at`, appends to Processing, then acks
    /// the Ready message. An ack failure is logged but not surfaced: the
    /// append is durable and a redelivered Ready copy only duplicates
    /// work.
    ///
    /// # Errors
    ///
    /// Returns an error when the Processing append fails; the Ready
    /// message stays unacked for redelivery.
    pub async fn move_to_processing(
        &self,
        mut record: TaskRecord,
        ready_message_id: &str,
    ) -> Result<TaskRecord> {
        record.processing_started_at = Some(Utc::now());

        let message_id = self.append_record(TaskStream::Processing, &record).await?;

        if let Err(e) = self
            .store
            .ack(
                TaskStream::Ready.name(),
                groups::TASK_PROCESSORS,
                ready_message_id,
            )
            .await
        {
            warn!(
                task_id = ?record.primary_task_id(),
                message_id = ready_message_id,
                error = %e,
                "failed to ack ready message after move to processing"
            );
        }

        if let Some(task_id) = record.primary_task_id() {
            self.index.update(
                task_id,
                TaskLocation {
                    stream: TaskStream::Processing,
                    message_id,
                    record: record.clone(),
                },
            );
        }

        debug!(task_id = ?record.primary_task_id(), "task moved to processing");
        Ok(record)
    }

    /// Routes a failed task through the retry policy.
    ///
    /// Increments `retry_count` first; at the ceiling the record moves to
    /// Failed permanently, otherwise to Retry with a future
    /// `scheduled_for`. The task's previous stream position (typically
    /// Processing) is acknowledged once the destination append succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination append fails; the source
    /// message stays unacked, so the failure is retried by redelivery.
    pub async fn schedule_retry(
        &self,
        mut record: TaskRecord,
        reason: &str,
    ) -> Result<RetryOutcome> {
        let task_id = record
            .primary_task_id()
            .ok_or_else(|| Error::serialization("record carries no task ID"))?;

        record.retry_count += 1;
        record.last_error = Some(reason.to_string());
        record.last_attempt_at = Some(Utc::now());

        match self.policy.decide(record.retry_count) {
            RetryDecision::Exhausted => {
                warn!(
                    task_id = %task_id,
                    retry_count = record.retry_count,
                    reason = reason,
                    "retry ceiling reached, moving task to failed stream"
                );
                record.scheduled_for = None;
                self.append_record(TaskStream::Failed, &record).await?;
                self.metrics.record_retry_exhausted();
                let previous = self.index.remove(task_id);
                self.ack_previous_location(task_id, previous).await;
                error!(
                    task_id = %task_id,
                    retry_count = record.retry_count,
                    "task permanently failed"
                );
                Ok(RetryOutcome::Exhausted)
            }
            RetryDecision::RetryAfter(delay) => {
                let scheduled_for = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                record.scheduled_for = Some(scheduled_for);
                let message_id = self.append_record(TaskStream::Retry, &record).await?;
                self.metrics.record_retry();
                let previous = self.index.update(
                    task_id,
                    TaskLocation {
                        stream: TaskStream::Retry,
                        message_id,
                        record: record.clone(),
                    },
                );
                self.ack_previous_location(task_id, previous).await;
                info!(
                    task_id = %task_id,
                    retry_count = record.retry_count,
                    scheduled_for = %scheduled_for,
                    reason = reason,
                    "task scheduled for retry"
                );
                Ok(RetryOutcome::Retried { scheduled_for })
            }
        }
    }

    /// Re-queues an eligible retry task into Ready.
    ///
    /// # Errors
    ///
    /// Returns an error when the Ready append fails; the Retry message
    /// stays unacked for redelivery.
    pub async fn requeue_from_retry(
        &self,
        mut record: TaskRecord,
        retry_message_id: &str,
    ) -> Result<String> {
        record.last_attempt_at = Some(Utc::now());

        let message_id = self.append_record(TaskStream::Ready, &record).await?;

        if let Err(e) = self
            .store
            .ack(
                TaskStream::Retry.name(),
                groups::RETRY_PROCESSORS,
                retry_message_id,
            )
            .await
        {
            warn!(
                task_id = ?record.primary_task_id(),
                message_id = retry_message_id,
                error = %e,
                "failed to ack retry message after requeue"
            );
        }

        if let Some(task_id) = record.primary_task_id() {
            self.index.update(
                task_id,
                TaskLocation {
                    stream: TaskStream::Ready,
                    message_id: message_id.clone(),
                    record: record.clone(),
                },
            );
            info!(
                task_id = %task_id,
                retry_count = record.retry_count,
                "task moved from retry to ready"
            );
        }
        Ok(message_id)
    }

    /// Finalizes a verified execution: moves the task from Processing to
    /// Completed and records execution metadata downstream.
    ///
    /// The task is resolved through the location index. Persistence
    /// failure is logged and does not roll back the move; the Completed
    /// stream is authoritative and the database a downstream projection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] when the task has no live
    /// Processing record, and a store error when the Completed append
    /// fails.
    pub async fn mark_completed(&self, task_id: TaskId, result: PerformerResult) -> Result<()> {
        let location = self
            .index
            .get(task_id)
            .filter(|l| l.stream == TaskStream::Processing)
            .ok_or(Error::TaskNotFound { task_id })?;

        let mut record = location.record;
        record.completed_at = Some(Utc::now());

        self.append_record(TaskStream::Completed, &record).await?;

        if let Err(e) = self
            .store
            .ack(
                TaskStream::Processing.name(),
                groups::TIMEOUT_CHECKERS,
                &location.message_id,
            )
            .await
        {
            warn!(
                task_id = %task_id,
                message_id = %location.message_id,
                error = %e,
                "failed to ack processing message after completion"
            );
        }
        self.index.remove(task_id);

        info!(
            task_id = %task_id,
            performer_id = %result.performer_id,
            "task completed"
        );

        match self.persistence.record_execution(task_id, &result).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(task_id = %task_id, "execution record was not persisted");
            }
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    error = %e,
                    "failed to persist execution record; completed stream remains authoritative"
                );
            }
        }
        Ok(())
    }

    /// Acknowledges a delivered message.
    ///
    /// Acknowledging an already-acknowledged message is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a store error when the acknowledgement cannot be recorded.
    pub async fn ack_message(
        &self,
        stream: TaskStream,
        group: &str,
        message_id: &str,
    ) -> Result<()> {
        self.store.ack(stream.name(), group, message_id).await
    }

    /// Acknowledges a task's previous position after a successful move.
    async fn ack_previous_location(&self, task_id: TaskId, previous: Option<TaskLocation>) {
        let Some(previous) = previous else {
            return;
        };
        if previous.stream.is_terminal() {
            return;
        }
        let group = group_for(previous.stream);
        if let Err(e) = self
            .store
            .ack(previous.stream.name(), group, &previous.message_id)
            .await
        {
            warn!(
                task_id = %task_id,
                stream = %previous.stream,
                message_id = %previous.message_id,
                error = %e,
                "failed to ack previous stream position"
            );
        }
    }

    /// Returns a point-in-time topology snapshot.
    pub async fn stream_info(&self) -> StreamInfo {
        let mut lengths = Vec::with_capacity(TaskStream::ALL.len());
        for stream in TaskStream::ALL {
            let length = match self.store.len(stream.name()).await {
                Ok(length) => i64::try_from(length).unwrap_or(i64::MAX),
                Err(e) => {
                    warn!(stream = %stream, error = %e, "failed to read stream length");
                    -1
                }
            };
            lengths.push(StreamLength {
                stream: stream.label(),
                length,
            });
        }
        StreamInfo {
            lengths,
            consumer_groups: self
                .registered_groups
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len(),
            max_retry_attempts: self.config.max_retry_attempts,
            stream_max_len: self.config.stream_max_len,
        }
    }

    /// Republishes the stream-length gauges.
    pub async fn update_stream_metrics(&self) {
        for stream in TaskStream::ALL {
            if let Ok(length) = self.store.len(stream.name()).await {
                self.metrics.set_stream_length(stream, length);
            }
        }
    }

    /// The location index; exposed for the submission path.
    pub(crate) fn index(&self) -> &TaskIndex {
        &self.index
    }

    /// The shared metrics recorder.
    pub(crate) fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }
}

/// The consumer group responsible for acknowledging a stream.
const fn group_for(stream: TaskStream) -> &'static str {
    match stream {
        TaskStream::Ready => groups::TASK_PROCESSORS,
        TaskStream::Processing => groups::TIMEOUT_CHECKERS,
        TaskStream::Retry => groups::RETRY_PROCESSORS,
        // Terminal streams are never acked; any group name is inert.
        TaskStream::Completed | TaskStream::Failed => groups::TASK_PROCESSORS,
    }
}
