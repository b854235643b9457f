//! Shared fixtures for integration tests: collaborator fakes and builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use strand_core::{JobId, PerformerId, SchedulerId, TaskDefinitionId, TaskId};
use strand_dispatch::clients::{
    DispatchPayload, ExecutionStore, PerformerDispatch, PerformerSelector, TaskSigner,
};
use strand_dispatch::config::EngineConfig;
use strand_dispatch::error::{Error, Result};
use strand_dispatch::payload::{TargetData, TriggerData};
use strand_dispatch::record::{PerformerAssignment, PerformerResult, TaskRecord};
use strand_dispatch::store::InMemoryStreamStore;
use strand_dispatch::stream::TaskStream;
use strand_dispatch::submit::SubmissionRequest;

/// Engine configuration with test-sized intervals and backoffs.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        max_retry_attempts: 3,
        base_backoff: Duration::from_millis(2),
        max_backoff: Duration::from_millis(50),
        processing_timeout: Duration::from_secs(10),
        dispatch_interval: Duration::from_millis(10),
        retry_interval: Duration::from_millis(15),
        timeout_interval: Duration::from_millis(25),
        metrics_interval: Duration::from_millis(200),
        send_timeout: Duration::from_millis(250),
        block_timeout: Duration::from_millis(10),
        batch_size: 1,
        batch_interval: Duration::from_millis(10),
        ..EngineConfig::default()
    }
}

/// Selector that always assigns the same performer.
pub struct StaticSelector {
    pub assignment: PerformerAssignment,
}

impl StaticSelector {
    pub fn new() -> Self {
        Self {
            assignment: PerformerAssignment {
                performer_id: PerformerId::new(3),
                address: "performer-3.example".into(),
            },
        }
    }
}

#[async_trait]
impl PerformerSelector for StaticSelector {
    async fn select_performer(&self, _record: &TaskRecord) -> Result<PerformerAssignment> {
        Ok(self.assignment.clone())
    }
}

/// How the scripted dispatcher responds to sends.
#[derive(Debug, Clone, Copy)]
pub enum SendScript {
    /// Every send succeeds.
    AlwaysOk,
    /// Every send fails with a network error.
    AlwaysErr,
    /// Every send is delivered but rejected.
    AlwaysRejected,
    /// The first `n` sends fail, then sends succeed.
    FailFirst(usize),
}

/// Dispatcher fake driven by a [`SendScript`].
pub struct ScriptedDispatch {
    script: SendScript,
    sends: AtomicUsize,
    pub sent_tasks: Mutex<Vec<TaskId>>,
}

impl ScriptedDispatch {
    pub fn new(script: SendScript) -> Self {
        Self {
            script,
            sends: AtomicUsize::new(0),
            sent_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PerformerDispatch for ScriptedDispatch {
    async fn send_to_performer(&self, _address: &str, payload: DispatchPayload) -> Result<bool> {
        let attempt = self.sends.fetch_add(1, Ordering::SeqCst);
        self.sent_tasks.lock().unwrap().push(payload.task_id);
        match self.script {
            SendScript::AlwaysOk => Ok(true),
            SendScript::AlwaysErr => Err(Error::Dispatch {
                message: "connection refused".into(),
            }),
            SendScript::AlwaysRejected => Ok(false),
            SendScript::FailFirst(n) if attempt < n => Err(Error::Dispatch {
                message: "connection refused".into(),
            }),
            SendScript::FailFirst(_) => Ok(true),
        }
    }
}

/// Signer that fails for specific task IDs and signs everything else.
pub struct SelectiveSigner {
    pub fail_for: Vec<i64>,
}

impl TaskSigner for SelectiveSigner {
    fn sign(&self, payload: &[u8]) -> Result<String> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).expect("signing payload is JSON");
        let task_id = value["taskIds"][0].as_i64().expect("payload has a task ID");
        if self.fail_for.contains(&task_id) {
            return Err(Error::Signing {
                task_id: TaskId::new(task_id),
                message: "key refused payload".into(),
            });
        }
        Ok(format!("sig-{task_id}"))
    }
}

/// Persistence fake recording every execution row.
#[derive(Default)]
pub struct RecordingExecutionStore {
    pub rows: Mutex<Vec<(TaskId, PerformerResult)>>,
    pub fail: bool,
}

#[async_trait]
impl ExecutionStore for RecordingExecutionStore {
    async fn record_execution(&self, task_id: TaskId, result: &PerformerResult) -> Result<bool> {
        if self.fail {
            return Err(Error::store("database unavailable"));
        }
        self.rows.lock().unwrap().push((task_id, result.clone()));
        Ok(true)
    }
}

/// Builds a submission request with index-matched rows per task ID.
pub fn request_for(task_ids: &[i64]) -> SubmissionRequest {
    SubmissionRequest {
        job_id: JobId::new(100),
        task_definition_id: TaskDefinitionId::new(1),
        task_ids: task_ids.iter().copied().map(TaskId::new).collect(),
        target_data: task_ids
            .iter()
            .map(|id| TargetData {
                chain_id: "11155111".into(),
                contract_address: format!("0xtarget{id}"),
                function: "execute()".into(),
                arguments: vec![id.to_string()],
                dynamic_arguments_url: None,
                expires_at: None,
            })
            .collect(),
        trigger_data: task_ids
            .iter()
            .map(|_| TriggerData::Time {
                interval_seconds: 60,
                cron_expression: None,
                next_execution_at: Utc::now(),
            })
            .collect(),
        scheduler_id: SchedulerId::new(7),
        source: "time-scheduler".into(),
    }
}

/// A verified execution result for completion callbacks.
pub fn performer_result() -> PerformerResult {
    PerformerResult {
        performer_id: PerformerId::new(3),
        tx_hash: "0xfeed".into(),
        proof_reference: "ipfs://proof".into(),
        cost: 0.25,
    }
}

/// Decodes every live task record in a stream.
pub fn records_in(store: &InMemoryStreamStore, stream: TaskStream) -> Vec<TaskRecord> {
    store
        .snapshot(stream.name())
        .unwrap()
        .iter()
        .filter_map(|m| TaskRecord::from_payload(&m.payload).ok())
        .collect()
}

/// Polls `condition` until it holds or the deadline passes.
pub async fn wait_for<F>(mut condition: F, deadline: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Shorthand for the full collaborator set around a shared store.
pub struct Harness {
    pub store: Arc<InMemoryStreamStore>,
    pub selector: Arc<StaticSelector>,
    pub signer: Arc<SelectiveSigner>,
    pub dispatcher: Arc<ScriptedDispatch>,
    pub persistence: Arc<RecordingExecutionStore>,
}

impl Harness {
    pub fn new(script: SendScript) -> Self {
        Self {
            store: Arc::new(InMemoryStreamStore::new()),
            selector: Arc::new(StaticSelector::new()),
            signer: Arc::new(SelectiveSigner { fail_for: vec![] }),
            dispatcher: Arc::new(ScriptedDispatch::new(script)),
            persistence: Arc::new(RecordingExecutionStore::default()),
        }
    }

    pub fn with_store(mut self, store: InMemoryStreamStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn with_failing_signer(mut self, fail_for: Vec<i64>) -> Self {
        self.signer = Arc::new(SelectiveSigner { fail_for });
        self
    }

    pub fn manager(&self, config: EngineConfig) -> strand_dispatch::manager::TaskManager {
        strand_dispatch::manager::TaskManager::new(
            self.store.clone(),
            self.selector.clone(),
            self.signer.clone(),
            self.dispatcher.clone(),
            self.persistence.clone(),
            config,
        )
    }
}
