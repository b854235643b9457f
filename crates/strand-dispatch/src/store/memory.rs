//! In-memory stream store implementation for testing.
//!
//! This module provides [`InMemoryStreamStore`], a single-process
//! implementation of the [`StreamStore`] trait suitable for tests and
//! development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No persistence, no distribution
//! - **Single-process only**: Streams are not visible across process
//!   boundaries
//! - **Approximate trimming**: The length cap is enforced on append, not
//!   continuously

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use ulid::Ulid;

use super::{StreamMessage, StreamStore};
use crate::error::{Error, Result};

/// One appended entry.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    id: String,
    payload: Vec<u8>,
    appended_at: Instant,
}

/// Delivery state of a message within one consumer group.
#[derive(Debug, Clone)]
struct Pending {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Next sequence number this group has not yet seen.
    cursor: u64,
    /// Delivered-but-unacknowledged messages, leased to one consumer.
    pending: HashMap<String, Pending>,
    /// Acknowledged message IDs; also marks messages consumed before
    /// delivery (acknowledge-by-id is allowed at any point).
    acked: HashSet<String>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: VecDeque<Entry>,
    next_seq: u64,
    ttl: Option<Duration>,
    groups: HashMap<String, GroupState>,
}

/// Converts a lock poison error to a store error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::store("stream store lock poisoned")
}

/// In-memory stream store for testing.
///
/// Thread-safe via a single `RwLock`; blocking group reads are woken by a
/// [`Notify`] on append.
///
/// ## Example
///
/// ```rust
/// use strand_dispatch::store::InMemoryStreamStore;
///
/// let store = InMemoryStreamStore::new();
/// // Drive the engine against it in tests...
/// ```
#[derive(Debug)]
pub struct InMemoryStreamStore {
    state: RwLock<HashMap<String, StreamState>>,
    notify: Notify,
    redelivery_after: Duration,
}

impl Default for InMemoryStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStreamStore {
    /// Creates a store with the default 30-second redelivery lease.
    #[must_use]
    pub fn new() -> Self {
        Self::with_redelivery_after(Duration::from_secs(30))
    }

    /// Creates a store with an explicit redelivery lease.
    ///
    /// Tests exercising redelivery use a short lease so unacknowledged
    /// messages come back without real waiting.
    #[must_use]
    pub fn with_redelivery_after(redelivery_after: Duration) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            notify: Notify::new(),
            redelivery_after,
        }
    }

    /// Returns all live entries of a stream, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn snapshot(&self, stream: &str) -> Result<Vec<StreamMessage>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .get(stream)
            .map(|s| {
                s.entries
                    .iter()
                    .map(|e| StreamMessage {
                        id: e.id.clone(),
                        payload: e.payload.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Returns the live entries a group has not acknowledged yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn unacked(&self, stream: &str, group: &str) -> Result<Vec<StreamMessage>> {
        let state = self.state.read().map_err(poison_err)?;
        let Some(stream_state) = state.get(stream) else {
            return Ok(Vec::new());
        };
        let acked = stream_state
            .groups
            .get(group)
            .map(|g| g.acked.clone())
            .unwrap_or_default();
        Ok(stream_state
            .entries
            .iter()
            .filter(|e| !acked.contains(&e.id))
            .map(|e| StreamMessage {
                id: e.id.clone(),
                payload: e.payload.clone(),
            })
            .collect())
    }

    /// Returns the number of delivered-but-unacknowledged messages for a
    /// group.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn pending_count(&self, stream: &str, group: &str) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len()))
    }

    /// Returns how often a message has been delivered to a group.
    ///
    /// Acknowledged messages report their last count; unknown messages
    /// report zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn delivery_count(&self, stream: &str, group: &str, message_id: &str) -> Result<u32> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .and_then(|g| g.pending.get(message_id))
            .map_or(0, |p| p.delivery_count))
    }

    /// Returns the consumer currently holding a message's lease.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn lease_holder(&self, stream: &str, group: &str, message_id: &str) -> Result<Option<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .and_then(|g| g.pending.get(message_id))
            .map(|p| p.consumer.clone()))
    }

    fn try_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamMessage>> {
        let mut state = self.state.write().map_err(poison_err)?;
        let stream_state = state
            .get_mut(stream)
            .ok_or_else(|| Error::store(format!("stream '{stream}' does not exist")))?;
        prune(stream_state);
        let StreamState {
            entries, groups, ..
        } = stream_state;
        let group_state = groups.get_mut(group).ok_or_else(|| {
            Error::store(format!(
                "consumer group '{group}' does not exist on stream '{stream}'"
            ))
        })?;

        let now = Instant::now();
        let mut delivered = Vec::new();

        // Redeliver lease-expired pending messages first, in stream order.
        for entry in entries.iter() {
            if delivered.len() >= count {
                break;
            }
            let Some(pending) = group_state.pending.get_mut(&entry.id) else {
                continue;
            };
            if now.duration_since(pending.delivered_at) < self.redelivery_after {
                continue;
            }
            pending.consumer = consumer.to_string();
            pending.delivered_at = now;
            pending.delivery_count += 1;
            delivered.push(StreamMessage {
                id: entry.id.clone(),
                payload: entry.payload.clone(),
            });
        }

        // Then deliver new messages past the group's cursor.
        for entry in entries.iter() {
            if delivered.len() >= count {
                break;
            }
            if entry.seq < group_state.cursor {
                continue;
            }
            group_state.cursor = entry.seq + 1;
            if group_state.acked.contains(&entry.id) {
                continue;
            }
            group_state.pending.insert(
                entry.id.clone(),
                Pending {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            delivered.push(StreamMessage {
                id: entry.id.clone(),
                payload: entry.payload.clone(),
            });
        }

        Ok(delivered)
    }
}

/// Drops entries past the length cap or retention window, together with
/// their per-group bookkeeping.
fn prune(stream_state: &mut StreamState) {
    let ttl = stream_state.ttl;
    let mut dropped = Vec::new();
    while let Some(front) = stream_state.entries.front() {
        let expired = ttl.is_some_and(|ttl| front.appended_at.elapsed() >= ttl);
        if !expired {
            break;
        }
        dropped.push(front.id.clone());
        stream_state.entries.pop_front();
    }
    if !dropped.is_empty() {
        for group in stream_state.groups.values_mut() {
            for id in &dropped {
                group.pending.remove(id);
                group.acked.remove(id);
            }
        }
    }
}

fn trim_to(stream_state: &mut StreamState, max_len: usize) {
    let mut dropped = Vec::new();
    while stream_state.entries.len() > max_len {
        if let Some(front) = stream_state.entries.pop_front() {
            dropped.push(front.id);
        }
    }
    if !dropped.is_empty() {
        for group in stream_state.groups.values_mut() {
            for id in &dropped {
                group.pending.remove(id);
                group.acked.remove(id);
            }
        }
    }
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn create_stream_if_not_exists(
        &self,
        stream: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.entry(stream.to_string()).or_insert_with(|| StreamState {
            ttl,
            ..StreamState::default()
        });
        Ok(())
    }

    async fn create_consumer_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let stream_state = state
            .get_mut(stream)
            .ok_or_else(|| Error::store(format!("stream '{stream}' does not exist")))?;
        stream_state
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn append(&self, stream: &str, max_len: usize, payload: &[u8]) -> Result<String> {
        let id = Ulid::new().to_string();
        {
            let mut state = self.state.write().map_err(poison_err)?;
            let stream_state = state.entry(stream.to_string()).or_default();
            let seq = stream_state.next_seq;
            stream_state.next_seq += 1;
            stream_state.entries.push_back(Entry {
                seq,
                id: id.clone(),
                payload: payload.to_vec(),
                appended_at: Instant::now(),
            });
            trim_to(stream_state, max_len);
            prune(stream_state);
        }
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamMessage>> {
        let deadline = Instant::now() + block;
        loop {
            let messages = self.try_read_group(stream, group, consumer, count)?;
            if !messages.is_empty() {
                return Ok(messages);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
            else {
                return Ok(messages);
            };
            // An append racing between the check and this wait is caught by
            // the deadline re-check.
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(stream_state) = state.get_mut(stream) else {
            return Ok(());
        };
        let group_state = stream_state
            .groups
            .entry(group.to_string())
            .or_default();
        group_state.pending.remove(message_id);
        group_state.acked.insert(message_id.to_string());
        Ok(())
    }

    async fn len(&self, stream: &str) -> Result<u64> {
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(stream_state) = state.get_mut(stream) else {
            return Ok(0);
        };
        prune(stream_state);
        Ok(stream_state.entries.len() as u64)
    }
}
