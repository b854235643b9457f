//! Background workers: dispatch, retry, timeout, batch flush, and metrics.
//!
//! Each worker is an independent timer-driven loop sharing no in-process
//! task state; coordination happens entirely through the store's consumer
//! groups. On shutdown every loop finishes its current iteration before
//! exiting, so a task is never left acknowledged-but-not-moved.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clients::{DispatchPayload, PerformerDispatch};
use crate::engine::{ReadTask, StreamEngine};
use crate::record::TaskRecord;
use crate::stream::{groups, TaskStream};
use crate::submit::Submitter;

/// Consumer name used by the retry worker.
const RETRY_CONSUMER: &str = "retry-worker";
/// Consumer name used by the timeout worker.
const TIMEOUT_CONSUMER: &str = "timeout-worker";

/// Handle over the spawned worker set.
///
/// Dropping the group does not stop the workers; call
/// [`WorkerGroup::shutdown_and_join`] for a clean stop.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawns the full worker set.
    #[must_use]
    pub(crate) fn spawn(
        engine: Arc<StreamEngine>,
        submitter: Arc<Submitter>,
        dispatcher: Arc<dyn PerformerDispatch>,
        consumer_name: String,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let send_permits = Arc::new(Semaphore::new(engine.config().dispatch_concurrency));

        let mut joins = Vec::with_capacity(5);
        {
            let engine = Arc::clone(&engine);
            let dispatcher = Arc::clone(&dispatcher);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                dispatch_loop(engine, dispatcher, send_permits, consumer_name, &mut rx).await;
            }));
        }
        {
            let engine = Arc::clone(&engine);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                retry_loop(engine, &mut rx).await;
            }));
        }
        {
            let engine = Arc::clone(&engine);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                timeout_loop(engine, &mut rx).await;
            }));
        }
        {
            let submitter = Arc::clone(&submitter);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                batch_flush_loop(submitter, &mut rx).await;
            }));
        }
        {
            let engine = Arc::clone(&engine);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                metrics_loop(engine, &mut rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    /// Signals every worker to stop after its current iteration.
    pub fn request_shutdown(&self) {
        // Receivers may already be gone.
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals shutdown and waits for every worker to exit.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

/// Returns once the shutdown flag is raised.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Drains the Ready stream: moves tasks into Processing and fires bounded
/// asynchronous sends to their performers.
async fn dispatch_loop(
    engine: Arc<StreamEngine>,
    dispatcher: Arc<dyn PerformerDispatch>,
    send_permits: Arc<Semaphore>,
    consumer_name: String,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    info!(consumer = %consumer_name, "dispatch worker started");
    let mut interval = tokio::time::interval(engine.config().dispatch_interval);

    loop {
        tokio::select! {
            () = shutdown_requested(shutdown_rx) => {
                info!(consumer = %consumer_name, "dispatch worker stopping");
                return;
            }
            _ = interval.tick() => {
                process_ready_tasks(&engine, &dispatcher, &send_permits, &consumer_name).await;
            }
        }
    }
}

async fn process_ready_tasks(
    engine: &Arc<StreamEngine>,
    dispatcher: &Arc<dyn PerformerDispatch>,
    send_permits: &Arc<Semaphore>,
    consumer_name: &str,
) {
    let count = engine.config().dispatch_read_count;
    let tasks = match engine
        .read_records(
            TaskStream::Ready,
            groups::TASK_PROCESSORS,
            consumer_name,
            count,
        )
        .await
    {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "failed to read tasks from ready stream");
            return;
        }
    };
    if tasks.is_empty() {
        return;
    }
    debug!(count = tasks.len(), "processing tasks from ready stream");

    for ReadTask { message_id, record } in tasks {
        let moved = match engine.move_to_processing(record, &message_id).await {
            Ok(moved) => moved,
            Err(e) => {
                error!(error = %e, "failed to move task to processing");
                continue;
            }
        };

        let engine = Arc::clone(engine);
        let dispatcher = Arc::clone(dispatcher);
        let permits = Arc::clone(send_permits);
        tokio::spawn(async move {
            send_to_performer(&engine, &dispatcher, &permits, moved).await;
        });
    }
}

/// Delivers one task to its performer, bounded by the send semaphore and
/// the configured send timeout. Any failure routes the task to the retry
/// path immediately.
async fn send_to_performer(
    engine: &Arc<StreamEngine>,
    dispatcher: &Arc<dyn PerformerDispatch>,
    permits: &Arc<Semaphore>,
    record: TaskRecord,
) {
    let Ok(_permit) = permits.acquire().await else {
        // Semaphore closed only at process teardown.
        return;
    };

    let payload = match DispatchPayload::from_record(&record) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                task_id = ?record.primary_task_id(),
                error = %e,
                "task cannot be dispatched"
            );
            fail_to_retry(engine, record, &e.to_string()).await;
            return;
        }
    };
    let address = payload.performer_address.clone();
    let task_id = payload.task_id;

    debug!(task_id = %task_id, address = %address, "sending task to performer");
    let send_timeout = engine.config().send_timeout;
    match tokio::time::timeout(send_timeout, dispatcher.send_to_performer(&address, payload)).await
    {
        Ok(Ok(true)) => {
            engine.metrics().record_send("success");
            info!(task_id = %task_id, "task sent to performer");
        }
        Ok(Ok(false)) => {
            engine.metrics().record_send("rejected");
            warn!(task_id = %task_id, "performer rejected dispatch");
            fail_to_retry(engine, record, "performer rejected dispatch").await;
        }
        Ok(Err(e)) => {
            engine.metrics().record_send("failure");
            warn!(task_id = %task_id, error = %e, "failed to send task to performer");
            fail_to_retry(engine, record, &e.to_string()).await;
        }
        Err(_) => {
            engine.metrics().record_send("timeout");
            warn!(task_id = %task_id, "performer send timed out");
            fail_to_retry(engine, record, "dispatch send timed out").await;
        }
    }
}

async fn fail_to_retry(engine: &Arc<StreamEngine>, record: TaskRecord, reason: &str) {
    if let Err(e) = engine.schedule_retry(record, reason).await {
        error!(error = %e, "failed to route task to retry path");
    }
}

/// Re-queues retry tasks whose backoff has elapsed.
///
/// Tasks not yet eligible are read but left unacknowledged, so the store
/// redelivers them on a later poll.
async fn retry_loop(engine: Arc<StreamEngine>, shutdown_rx: &mut watch::Receiver<bool>) {
    info!("retry worker started");
    let mut interval = tokio::time::interval(engine.config().retry_interval);

    loop {
        tokio::select! {
            () = shutdown_requested(shutdown_rx) => {
                info!("retry worker stopping");
                return;
            }
            _ = interval.tick() => {
                process_retry_tasks(&engine).await;
            }
        }
    }
}

async fn process_retry_tasks(engine: &Arc<StreamEngine>) {
    let count = engine.config().retry_read_count;
    let tasks = match engine
        .read_records(
            TaskStream::Retry,
            groups::RETRY_PROCESSORS,
            RETRY_CONSUMER,
            count,
        )
        .await
    {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "failed to read retry tasks");
            return;
        }
    };

    let now = Utc::now();
    let mut requeued = 0usize;
    for ReadTask { message_id, record } in tasks {
        // Unset scheduled_for means immediately eligible.
        let eligible = record.scheduled_for.is_none_or(|at| at <= now);
        if !eligible {
            debug!(
                task_id = ?record.primary_task_id(),
                scheduled_for = ?record.scheduled_for,
                "task not yet eligible for retry"
            );
            continue;
        }
        match engine.requeue_from_retry(record, &message_id).await {
            Ok(_) => requeued += 1,
            Err(e) => error!(error = %e, "failed to move retry task to ready"),
        }
    }
    if requeued > 0 {
        info!(requeued, "processed retry tasks");
    }
}

/// Reclaims tasks abandoned in Processing past the configured budget.
async fn timeout_loop(engine: Arc<StreamEngine>, shutdown_rx: &mut watch::Receiver<bool>) {
    info!("timeout worker started");
    let mut interval = tokio::time::interval(engine.config().timeout_interval);

    loop {
        tokio::select! {
            () = shutdown_requested(shutdown_rx) => {
                info!("timeout worker stopping");
                return;
            }
            _ = interval.tick() => {
                check_processing_timeouts(&engine).await;
            }
        }
    }
}

async fn check_processing_timeouts(engine: &Arc<StreamEngine>) {
    let count = engine.config().timeout_read_count;
    let tasks = match engine
        .read_records(
            TaskStream::Processing,
            groups::TIMEOUT_CHECKERS,
            TIMEOUT_CONSUMER,
            count,
        )
        .await
    {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "failed to read processing tasks for timeout check");
            return;
        }
    };

    let budget = engine.config().processing_timeout;
    let now = Utc::now();
    let mut timed_out = 0usize;
    for ReadTask { message_id, record } in tasks {
        let Some(started_at) = record.processing_started_at else {
            continue;
        };
        let elapsed = (now - started_at).to_std().unwrap_or_default();
        if elapsed <= budget {
            continue;
        }

        warn!(
            task_id = ?record.primary_task_id(),
            elapsed_secs = elapsed.as_secs(),
            "task processing timeout detected"
        );
        match engine.schedule_retry(record, "processing timeout").await {
            Ok(_) => {
                if let Err(e) = engine
                    .ack_message(TaskStream::Processing, groups::TIMEOUT_CHECKERS, &message_id)
                    .await
                {
                    warn!(message_id = %message_id, error = %e, "failed to ack timed-out task");
                }
                timed_out += 1;
            }
            Err(e) => {
                error!(error = %e, "failed to handle timed-out task");
            }
        }
    }
    if timed_out > 0 {
        info!(timed_out, "processed task timeouts");
    }
}

/// Flushes the submission batch buffer on its interval; a final flush runs
/// on shutdown so buffered records are never dropped.
async fn batch_flush_loop(submitter: Arc<Submitter>, shutdown_rx: &mut watch::Receiver<bool>) {
    info!("batch flush worker started");
    let mut interval = tokio::time::interval(submitter.config().batch_interval);

    loop {
        tokio::select! {
            () = shutdown_requested(shutdown_rx) => {
                info!("batch flush worker stopping, flushing final batch");
                submitter.flush().await;
                return;
            }
            _ = interval.tick() => {
                submitter.flush().await;
            }
        }
    }
}

/// Republishes stream-length gauges on a fixed interval.
async fn metrics_loop(engine: Arc<StreamEngine>, shutdown_rx: &mut watch::Receiver<bool>) {
    info!("metrics worker started");
    let mut interval = tokio::time::interval(engine.config().metrics_interval);

    loop {
        tokio::select! {
            () = shutdown_requested(shutdown_rx) => {
                info!("metrics worker stopping");
                return;
            }
            _ = interval.tick() => {
                engine.update_stream_metrics().await;
            }
        }
    }
}
