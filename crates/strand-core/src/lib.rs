//! # strand-core
//!
//! Core abstractions shared across the Strand task network services.
//!
//! This crate provides the foundational types used by every Strand component:
//!
//! - **Identifiers**: Strongly-typed IDs for jobs, tasks, schedulers, and performers
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured logging bootstrap and span constructors
//!
//! ## Crate Boundary
//!
//! `strand-core` is the **only** crate allowed to define shared primitives.
//! Domain crates (such as `strand-dispatch`) depend on it and never on each
//! other's internals.
//!
//! ## Example
//!
//! ```rust
//! use strand_core::prelude::*;
//!
//! let job = JobId::new(42);
//! let task = TaskId::new(7);
//! assert_ne!(job.value(), task.value());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

pub use error::{Error, Result};
pub use id::{JobId, PerformerId, SchedulerId, TaskDefinitionId, TaskId};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use strand_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{JobId, PerformerId, SchedulerId, TaskDefinitionId, TaskId};
    pub use crate::observability::{init_logging, LogFormat};
}
