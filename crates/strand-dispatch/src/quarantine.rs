//! Poison-message quarantine.
//!
//! A message that repeatedly fails to decode would otherwise be redelivered
//! forever and block its consumer group. The ledger counts decode failures
//! per message ID; once the ceiling is reached the raw payload is wrapped
//! in a [`QuarantinedPayload`], appended to the Failed stream, and the
//! original message is acknowledged.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A poison message preserved in the Failed stream for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantinedPayload {
    /// Stream the message was read from.
    pub source_stream: String,
    /// Store message ID of the poison message.
    pub message_id: String,
    /// Raw payload, lossily decoded for inspection.
    pub payload: String,
    /// Why the message was quarantined.
    pub reason: String,
    /// When the quarantine happened.
    pub quarantined_at: DateTime<Utc>,
}

impl QuarantinedPayload {
    /// Wraps a raw payload for quarantine.
    #[must_use]
    pub fn new(
        source_stream: impl Into<String>,
        message_id: impl Into<String>,
        payload: &[u8],
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_stream: source_stream.into(),
            message_id: message_id.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            reason: reason.into(),
            quarantined_at: Utc::now(),
        }
    }
}

/// Counts decode failures per message ID up to a ceiling.
#[derive(Debug)]
pub struct QuarantineLedger {
    failures: Mutex<HashMap<String, u32>>,
    ceiling: u32,
}

impl QuarantineLedger {
    /// Creates a ledger with the given decode-failure ceiling.
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            ceiling,
        }
    }

    /// Counts one decode failure.
    ///
    /// Returns `true` when the message has now reached the ceiling and
    /// must be quarantined.
    pub fn record_failure(&self, message_id: &str) -> bool {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = failures.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        *count >= self.ceiling
    }

    /// Forgets a message, after quarantine or a successful decode.
    pub fn forget(&self, message_id: &str) {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(message_id);
    }

    /// Number of messages currently being tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
