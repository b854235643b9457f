//! # strand-dispatch
//!
//! Task stream processing engine for the Strand task network.
//!
//! This crate implements the dispatch domain: it owns the task lifecycle,
//! the queue topology, retry and backoff policy, timeout detection, and
//! performer dispatch.
//!
//! ## Core Concepts
//!
//! - **Task record**: The envelope carried through every stream, one task
//!   per record after submission fan-out
//! - **Streams**: Five fixed, append-only logs (Ready, Processing, Retry,
//!   Completed, Failed) behind the [`store::StreamStore`] abstraction
//! - **Workers**: Independent timer-driven loops moving records between
//!   streams with move-then-acknowledge transitions
//!
//! ## Guarantees
//!
//! - **At-least-once**: A crash mid-transition duplicates a task, never
//!   loses it; exactly-once is explicitly out of scope
//! - **Failure isolation**: Batch submissions fan out into independent
//!   records with per-task retry state
//! - **Bounded backoff**: Retry delay grows with the attempt count up to a
//!   cap, with jitter against thundering herds
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strand_dispatch::clients::Sha256Signer;
//! use strand_dispatch::config::EngineConfig;
//! use strand_dispatch::manager::TaskManager;
//! use strand_dispatch::store::InMemoryStreamStore;
//!
//! # use strand_dispatch::clients::{PerformerDispatch, PerformerSelector, ExecutionStore};
//! # async fn run(
//! #     selector: Arc<dyn PerformerSelector>,
//! #     dispatcher: Arc<dyn PerformerDispatch>,
//! #     persistence: Arc<dyn ExecutionStore>,
//! # ) -> strand_dispatch::error::Result<()> {
//! let store = Arc::new(InMemoryStreamStore::new());
//! let signer = Arc::new(Sha256Signer::new("dev-key"));
//!
//! let mut manager = TaskManager::new(
//!     store,
//!     selector,
//!     signer,
//!     dispatcher,
//!     persistence,
//!     EngineConfig::default(),
//! );
//! manager.initialize().await?;
//! manager.start("dispatch-1");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod backoff;
pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod manager;
pub mod metrics;
pub mod payload;
pub mod quarantine;
pub mod record;
pub mod store;
pub mod stream;
pub mod submit;
pub mod workers;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backoff::{RetryDecision, RetryPolicy};
    pub use crate::clients::{
        DispatchPayload, ExecutionStore, PerformerDispatch, PerformerSelector, Sha256Signer,
        TaskSigner,
    };
    pub use crate::config::EngineConfig;
    pub use crate::engine::{ReadTask, RetryOutcome, StreamEngine, StreamInfo};
    pub use crate::error::{Error, Result};
    pub use crate::manager::TaskManager;
    pub use crate::metrics::DispatchMetrics;
    pub use crate::payload::{TargetData, TriggerData};
    pub use crate::record::{PerformerAssignment, PerformerResult, TaskRecord};
    pub use crate::store::{InMemoryStreamStore, StreamMessage, StreamStore};
    pub use crate::stream::{StreamDescriptor, TaskStream};
    pub use crate::submit::{SubmissionReport, SubmissionRequest, Submitter};
    pub use crate::workers::WorkerGroup;
}
