//! The task record: the envelope carried through every stream.
//!
//! A record is created once by submission fan-out and mutated only at
//! worker transitions, which stamp the lifecycle timestamps. After fan-out
//! a record always carries exactly one task ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strand_core::{JobId, PerformerId, SchedulerId, TaskDefinitionId, TaskId};

use crate::error::Result;
use crate::payload::{TargetData, TriggerData};

/// The performer an engine assigned to a task: identity plus address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformerAssignment {
    /// Identity of the selected performer.
    pub performer_id: PerformerId,
    /// Network address the task payload is delivered to.
    pub address: String,
}

/// Verified execution result reported through the completion callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformerResult {
    /// Performer that executed the task.
    pub performer_id: PerformerId,
    /// Transaction hash of the execution.
    pub tx_hash: String,
    /// Reference to the execution proof artifact.
    pub proof_reference: String,
    /// Execution cost reported by the performer.
    pub cost: f64,
}

/// Envelope for a task flowing through the dispatch streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// The originating scheduled job.
    pub job_id: JobId,
    /// Task-definition kind the job was registered under.
    pub task_definition_id: TaskDefinitionId,
    /// Task identifiers carried by this record; always length 1 after
    /// fan-out.
    pub task_ids: Vec<TaskId>,
    /// Execution targets, matched index-wise to `task_ids`.
    pub target_data: Vec<TargetData>,
    /// Trigger context, matched index-wise to `task_ids`.
    pub trigger_data: Vec<TriggerData>,
    /// Assigned performer; `None` until the selector has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer: Option<PerformerAssignment>,
    /// Scheduler that submitted the task.
    pub scheduler_id: SchedulerId,
    /// Free-form source tag supplied by the scheduler.
    pub source: String,
    /// Signature over the record produced at submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_signature: Option<String>,
    /// Immutable creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the dispatch worker moved the record into Processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    /// When the completion callback verified the execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// When the record last left the Retry stream (or entered it).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the retry worker may re-queue the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Retry attempts consumed so far; monotone, never decremented.
    pub retry_count: u32,
    /// Last failure reason, cleared only implicitly by moving streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TaskRecord {
    /// Creates a fresh record for a single task, as produced by fan-out.
    #[must_use]
    pub fn new(
        job_id: JobId,
        task_definition_id: TaskDefinitionId,
        task_id: TaskId,
        target: TargetData,
        trigger: TriggerData,
        scheduler_id: SchedulerId,
        source: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            task_definition_id,
            task_ids: vec![task_id],
            target_data: vec![target],
            trigger_data: vec![trigger],
            performer: None,
            scheduler_id,
            source: source.into(),
            manager_signature: None,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
            last_attempt_at: None,
            scheduled_for: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// The single task identifier this record carries.
    ///
    /// Returns `None` only for malformed wire payloads; records produced
    /// by fan-out always carry exactly one ID.
    #[must_use]
    pub fn primary_task_id(&self) -> Option<TaskId> {
        self.task_ids.first().copied()
    }

    /// Canonical bytes the manager signature is computed over.
    ///
    /// The signature field itself is excluded so verification can
    /// reconstruct the same bytes.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be encoded.
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.manager_signature = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Encodes the record for a stream append.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be encoded.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a record from a stream payload.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed payloads; callers route
    /// those through the quarantine ledger.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::TriggerData;

    fn record() -> TaskRecord {
        TaskRecord::new(
            JobId::new(5),
            TaskDefinitionId::new(1),
            TaskId::new(50),
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
            SchedulerId::new(2),
            "time-scheduler",
        )
    }

    #[test]
    fn new_record_starts_unattempted() {
        let record = record();
        assert_eq!(record.retry_count, 0);
        assert!(record.performer.is_none());
        assert!(record.processing_started_at.is_none());
        assert_eq!(record.primary_task_id(), Some(TaskId::new(50)));
    }

    #[test]
    fn payload_round_trips() {
        let record = record();
        let bytes = record.to_payload().unwrap();
        let decoded = TaskRecord::from_payload(&bytes).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn signing_payload_excludes_the_signature() {
        let mut record = record();
        let unsigned = record.signing_payload().unwrap();
        record.manager_signature = Some("sig".into());
        let signed_view = record.signing_payload().unwrap();
        assert_eq!(unsigned, signed_view);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(TaskRecord::from_payload(b"not json").is_err());
    }
}
