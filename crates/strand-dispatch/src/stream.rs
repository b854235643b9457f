//! Stream topology: the five fixed task streams and their consumer groups.
//!
//! A task record logically belongs to exactly one stream at a time.
//! Transitions follow the move-then-acknowledge pattern: the record is
//! durably appended to the destination stream before the source message is
//! acknowledged, so a crash between the two steps duplicates work but never
//! loses it.

use std::fmt;
use std::time::Duration;

use crate::config::EngineConfig;

/// Consumer-group names used by the engine's workers.
pub mod groups {
    /// Group draining the Ready stream (dispatch workers).
    pub const TASK_PROCESSORS: &str = "task-processors";
    /// Group scanning the Processing stream (timeout workers).
    pub const TIMEOUT_CHECKERS: &str = "timeout-checkers";
    /// Group draining the Retry stream (retry workers).
    pub const RETRY_PROCESSORS: &str = "retry-processors";
}

/// The five fixed streams a task record moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStream {
    /// Tasks awaiting dispatch to a performer.
    Ready,
    /// Tasks handed to a performer, awaiting completion or timeout.
    Processing,
    /// Tasks waiting out their backoff before re-entering Ready.
    Retry,
    /// Terminal: tasks whose execution result was verified.
    Completed,
    /// Terminal: tasks that exhausted their retries or were quarantined.
    Failed,
}

impl TaskStream {
    /// All streams, in topology-creation order.
    pub const ALL: [Self; 5] = [
        Self::Ready,
        Self::Processing,
        Self::Retry,
        Self::Completed,
        Self::Failed,
    ];

    /// Returns the store-level stream name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ready => "tasks:ready",
            Self::Processing => "tasks:processing",
            Self::Retry => "tasks:retry",
            Self::Completed => "tasks:completed",
            Self::Failed => "tasks:failed",
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Retry => "retry",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal streams never re-enqueue their records.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declarative description of one stream: its name and retention policy.
#[derive(Debug, Clone, Copy)]
pub struct StreamDescriptor {
    /// The stream being described.
    pub stream: TaskStream,
    /// Retention window; `None` keeps records until they are moved or
    /// trimmed by the length cap.
    pub ttl: Option<Duration>,
}

/// Builds the descriptor set for the configured topology.
///
/// Ready and Processing are unbounded (records leave by being moved);
/// the terminal and retry streams carry the operator-configured TTLs.
#[must_use]
pub fn descriptors(config: &EngineConfig) -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor {
            stream: TaskStream::Ready,
            ttl: None,
        },
        StreamDescriptor {
            stream: TaskStream::Processing,
            ttl: None,
        },
        StreamDescriptor {
            stream: TaskStream::Retry,
            ttl: Some(config.retry_ttl),
        },
        StreamDescriptor {
            stream: TaskStream::Completed,
            ttl: Some(config.completed_ttl),
        },
        StreamDescriptor {
            stream: TaskStream::Failed,
            ttl: Some(config.failed_ttl),
        },
    ]
}
