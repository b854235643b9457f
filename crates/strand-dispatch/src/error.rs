//! Error types for the task dispatch domain.

use strand_core::TaskId;

/// The result type used throughout strand-dispatch.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A stream store operation failed.
    #[error("store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A task payload could not be serialized or deserialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Signing a task record failed.
    #[error("signing error for task {task_id}: {message}")]
    Signing {
        /// The task whose record could not be signed.
        task_id: TaskId,
        /// Description of the signing failure.
        message: String,
    },

    /// No performer could be assigned to a task.
    #[error("no performer available: {message}")]
    NoPerformerAvailable {
        /// Description of why selection failed.
        message: String,
    },

    /// A task was not found where the engine expected it.
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// The task ID that was looked up.
        task_id: TaskId,
    },

    /// A submission request failed boundary validation.
    #[error("invalid submission: {message}")]
    InvalidSubmission {
        /// Description of the validation failure.
        message: String,
    },

    /// Dispatching a task payload to a performer failed.
    #[error("dispatch error: {message}")]
    Dispatch {
        /// Description of the dispatch failure.
        message: String,
    },

    /// An error from strand-core.
    #[error("core error: {0}")]
    Core(#[from] strand_core::Error),
}

impl Error {
    /// Creates a new store error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store error with a source.
    #[must_use]
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
