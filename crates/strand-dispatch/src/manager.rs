//! The task manager: wires the engine, collaborators, and workers into one
//! service-facing component.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use strand_core::TaskId;

use crate::clients::{ExecutionStore, PerformerDispatch, PerformerSelector, TaskSigner};
use crate::config::EngineConfig;
use crate::engine::{StreamEngine, StreamInfo};
use crate::error::Result;
use crate::metrics::DispatchMetrics;
use crate::record::PerformerResult;
use crate::store::StreamStore;
use crate::submit::{BatchStats, SubmissionReport, SubmissionRequest, Submitter};
use crate::workers::WorkerGroup;

/// Bound on how long shutdown waits for workers to finish.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

/// Orchestrates the stream engine and its background workers.
///
/// One manager per process; horizontal scale comes from running more
/// processes against the same store, coordinated by consumer groups.
pub struct TaskManager {
    engine: Arc<StreamEngine>,
    submitter: Arc<Submitter>,
    dispatcher: Arc<dyn PerformerDispatch>,
    workers: Option<WorkerGroup>,
}

impl TaskManager {
    /// Creates a manager over a store and the external collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn StreamStore>,
        selector: Arc<dyn PerformerSelector>,
        signer: Arc<dyn TaskSigner>,
        dispatcher: Arc<dyn PerformerDispatch>,
        persistence: Arc<dyn ExecutionStore>,
        config: EngineConfig,
    ) -> Self {
        let metrics = DispatchMetrics::new();
        let engine = Arc::new(StreamEngine::new(store, persistence, config, metrics));
        let submitter = Arc::new(Submitter::new(Arc::clone(&engine), selector, signer));
        Self {
            engine,
            submitter,
            dispatcher,
            workers: None,
        }
    }

    /// Creates the stream topology.
    ///
    /// Must succeed before `start`; a failure here means the store is
    /// unreachable and is fatal for the service.
    ///
    /// # Errors
    ///
    /// Returns a store error when topology creation fails.
    pub async fn initialize(&self) -> Result<()> {
        info!("initializing task manager");
        self.engine.initialize().await?;
        info!("task manager initialized");
        Ok(())
    }

    /// Spawns the background workers.
    ///
    /// `consumer_name` identifies this process within the Ready stream's
    /// consumer group; multiple manager instances use distinct names.
    pub fn start(&mut self, consumer_name: impl Into<String>) {
        if self.workers.is_some() {
            warn!("task manager already started");
            return;
        }
        let consumer_name = consumer_name.into();
        info!(consumer = %consumer_name, "starting task manager workers");
        self.workers = Some(WorkerGroup::spawn(
            Arc::clone(&self.engine),
            Arc::clone(&self.submitter),
            Arc::clone(&self.dispatcher),
            consumer_name,
        ));
    }

    /// Whether the background workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Accepts a task submission from a scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error only for request-shape failures; per-task
    /// outcomes are carried in the report.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReport> {
        self.submitter.submit(request).await
    }

    /// Completion callback: finalizes a verified execution result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::TaskNotFound`] when the task has no
    /// live Processing record, or a store error when the move fails.
    pub async fn mark_completed(&self, task_id: TaskId, result: PerformerResult) -> Result<()> {
        self.engine.mark_completed(task_id, result).await
    }

    /// Point-in-time topology snapshot for health endpoints.
    pub async fn stream_info(&self) -> StreamInfo {
        self.engine.stream_info().await
    }

    /// Batch accumulator statistics.
    #[must_use]
    pub fn batch_stats(&self) -> BatchStats {
        self.submitter.batch_stats()
    }

    /// Direct access to the engine, for embedding services that drive
    /// transitions themselves.
    #[must_use]
    pub fn engine(&self) -> &Arc<StreamEngine> {
        &self.engine
    }

    /// Stops the workers, letting each finish its current iteration.
    ///
    /// The batch flush worker performs a final flush before exiting, so
    /// buffered submissions are not dropped. Waits up to a bounded window
    /// for the workers to join.
    pub async fn shutdown(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };
        info!("shutting down task manager");
        if tokio::time::timeout(SHUTDOWN_WAIT, workers.shutdown_and_join())
            .await
            .is_err()
        {
            warn!("timed out waiting for workers to stop");
        }
        info!("task manager stopped");
    }
}
