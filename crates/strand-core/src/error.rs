//! Error types and result aliases shared across Strand components.

/// The result type used throughout strand-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A configuration value was out of range or malformed.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the offending value.
        message: String,
    },
}
