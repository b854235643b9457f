//! Observability infrastructure for Strand.
//!
//! Structured logging with consistent spans across all Strand services.
//! This module provides initialization helpers and span constructors so
//! every component logs with the same fields. There is no process-global
//! logger handle: components emit through the `tracing` facade and the
//! embedding binary installs the subscriber exactly once.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `strand_dispatch=debug`)
///
/// # Example
///
/// ```rust
/// use strand_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for stream operations with standard fields.
///
/// # Example
///
/// ```rust
/// use strand_core::observability::stream_span;
///
/// let span = stream_span("append", "tasks:ready");
/// let _guard = span.enter();
/// // ... do stream operation
/// ```
#[must_use]
pub fn stream_span(operation: &str, stream: &str) -> Span {
    tracing::info_span!(
        "stream",
        op = operation,
        stream = stream,
    )
}

/// Creates a span for task lifecycle operations.
///
/// # Example
///
/// ```rust
/// use strand_core::observability::task_span;
///
/// let span = task_span("dispatch", 42);
/// let _guard = span.enter();
/// // ... do task operation
/// ```
#[must_use]
pub fn task_span(operation: &str, task_id: i64) -> Span {
    tracing::info_span!(
        "task",
        op = operation,
        task_id = task_id,
    )
}
