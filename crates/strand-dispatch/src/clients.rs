//! Collaborator contracts consumed by the engine.
//!
//! The engine never talks to the network or a database directly: performer
//! selection, payload delivery, signing, and result persistence all sit
//! behind these traits. Production wires real clients; tests wire fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use strand_core::{TaskDefinitionId, TaskId};

use crate::error::Result;
use crate::record::{PerformerAssignment, PerformerResult, TaskRecord};

/// Wire payload handed to a performer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    /// Task being dispatched.
    pub task_id: TaskId,
    /// Task-definition kind, for performer-side routing.
    pub task_definition_id: TaskDefinitionId,
    /// Address the payload is delivered to.
    pub performer_address: String,
    /// Serialized task record the performer executes against.
    pub data: Vec<u8>,
}

impl DispatchPayload {
    /// Builds the wire payload for a record with an assigned performer.
    ///
    /// # Errors
    ///
    /// Returns an error if the record carries no task ID or no performer,
    /// or cannot be serialized.
    pub fn from_record(record: &TaskRecord) -> Result<Self> {
        let task_id = record.primary_task_id().ok_or_else(|| {
            crate::error::Error::serialization("record carries no task ID")
        })?;
        let performer = record.performer.as_ref().ok_or_else(|| {
            crate::error::Error::Dispatch {
                message: format!("task {task_id} has no performer assignment"),
            }
        })?;
        Ok(Self {
            task_id,
            task_definition_id: record.task_definition_id,
            performer_address: performer.address.clone(),
            data: record.to_payload()?,
        })
    }
}

/// Delivers task payloads to remote performers.
///
/// Implementations are expected to be time-bounded by the caller; the
/// dispatch worker wraps every send in the configured timeout.
#[async_trait]
pub trait PerformerDispatch: Send + Sync {
    /// Sends a payload to the performer at `address`.
    ///
    /// Returns `Ok(false)` for a delivered-but-rejected send; both that
    /// and an `Err` route the task to the retry path.
    async fn send_to_performer(&self, address: &str, payload: DispatchPayload) -> Result<bool>;
}

/// Resolves a performer assignment for a record at submission time.
#[async_trait]
pub trait PerformerSelector: Send + Sync {
    /// Selects a performer for the record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NoPerformerAvailable`] when no
    /// healthy performer exists.
    async fn select_performer(&self, record: &TaskRecord) -> Result<PerformerAssignment>;
}

/// Signs task records on behalf of the manager.
///
/// The signature scheme is a black box to the engine; only the opaque
/// signature string travels with the record.
pub trait TaskSigner: Send + Sync {
    /// Signs the canonical record bytes.
    ///
    /// # Errors
    ///
    /// Returns a signing error when the key material is unavailable or the
    /// payload is rejected.
    fn sign(&self, payload: &[u8]) -> Result<String>;
}

/// Durably records verified execution metadata.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Records one verified execution.
    ///
    /// Returns whether the row was written; failures are logged by the
    /// finalizer and never roll back the stream transition.
    async fn record_execution(&self, task_id: TaskId, result: &PerformerResult) -> Result<bool>;
}

/// Keyed SHA-256 fingerprint signer for development and tests.
///
/// Not a real signature scheme; production deployments plug in their
/// actual signing service behind [`TaskSigner`].
#[derive(Debug, Clone)]
pub struct Sha256Signer {
    key: String,
}

impl Sha256Signer {
    /// Creates a signer with the given key material.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl TaskSigner for Sha256Signer {
    fn sign(&self, payload: &[u8]) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(payload);
        Ok(hex::encode(hasher.finalize()))
    }
}
