//! Stream store abstraction.
//!
//! This module provides:
//!
//! - [`StreamStore`]: Trait over the persistent, ordered message log the
//!   engine keeps all task state in
//! - [`StreamMessage`]: One delivered message (ID plus payload)
//! - [`InMemoryStreamStore`]: In-memory implementation for tests and
//!   development
//!
//! ## Design Principles
//!
//! - **Backend agnostic**: Same interface for Redis streams, log services,
//!   or local memory
//! - **At-least-once**: Unacknowledged messages are redelivered after a
//!   lease window; consumers tolerate duplicates
//! - **Group leasing**: Within one consumer group, an unacknowledged
//!   message is delivered to exactly one consumer at a time

pub mod memory;

pub use memory::InMemoryStreamStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// One message delivered from a stream read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Store-assigned message identifier, unique within the stream.
    pub id: String,
    /// Opaque payload bytes as appended.
    pub payload: Vec<u8>,
}

/// Persistent, ordered, appendable log with consumer-group semantics.
///
/// All task state lives behind this trait; the engine holds no task state
/// of its own beyond caches it can rebuild. Implementations must provide
/// at-least-once redelivery of unacknowledged messages and deliver each
/// unacknowledged message to at most one consumer per group at a time.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from the
/// background workers.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Creates a stream with the given retention, as a no-op if it exists.
    async fn create_stream_if_not_exists(
        &self,
        stream: &str,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Creates a consumer group on a stream, as a no-op if it exists.
    async fn create_consumer_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Appends a payload, trimming the stream to roughly `max_len` entries.
    ///
    /// Returns the store-assigned message ID.
    async fn append(&self, stream: &str, max_len: usize, payload: &[u8]) -> Result<String>;

    /// Reads up to `count` messages for `consumer` within `group`,
    /// blocking up to `block` when the stream is empty.
    ///
    /// New messages and lease-expired redeliveries are both returned;
    /// every returned message is leased to `consumer` until acknowledged
    /// or the lease lapses.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamMessage>>;

    /// Acknowledges a delivered message.
    ///
    /// Acknowledging an unknown or already-acknowledged message is a
    /// no-op, never an error.
    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> Result<()>;

    /// Returns the number of live entries in the stream.
    async fn len(&self, stream: &str) -> Result<u64>;
}
