//! Process-local task location index.
//!
//! Maps a task ID to its last-known stream position so the completion
//! callback and the retry path resolve tasks in O(1) instead of scanning
//! the Processing stream. The index is a rebuildable cache: the stream
//! store stays the source of truth, and a missing entry only degrades a
//! lookup into a not-found error handled by the caller.

use std::collections::HashMap;
use std::sync::Mutex;

use strand_core::TaskId;

use crate::record::TaskRecord;
use crate::stream::TaskStream;

/// Last-known position of a task.
#[derive(Debug, Clone)]
pub struct TaskLocation {
    /// Stream the task's live record sits in.
    pub stream: TaskStream,
    /// Message ID of that record.
    pub message_id: String,
    /// The record as last appended.
    pub record: TaskRecord,
}

/// Mutex-guarded task-ID index; critical sections are lookup/insert only.
#[derive(Debug, Default)]
pub struct TaskIndex {
    inner: Mutex<HashMap<TaskId, TaskLocation>>,
}

impl TaskIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the task's new location, replacing any previous one.
    ///
    /// Returns the previous location, which callers acknowledge out of its
    /// stream to finish the move.
    pub fn update(&self, task_id: TaskId, location: TaskLocation) -> Option<TaskLocation> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(task_id, location)
    }

    /// Returns the task's last-known location.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<TaskLocation> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&task_id)
            .cloned()
    }

    /// Drops the task from the index, returning its last location.
    pub fn remove(&self, task_id: TaskId) -> Option<TaskLocation> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&task_id)
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the index tracks no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
