//! Retry policy: maps a retry count to a backoff delay.
//!
//! The deterministic part grows linearly with the retry count up to a cap;
//! a uniform jitter term drawn from `[0, base_backoff)` spreads out
//! re-submissions when many tasks fail at once.

use std::time::Duration;

use rand::Rng;

use crate::config::EngineConfig;

/// Outcome of consulting the policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    RetryAfter(Duration),
    /// The retry ceiling is reached; the task is terminal.
    Exhausted,
}

/// Pure backoff policy shared by every failure path.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base unit of the backoff and the jitter bound.
    pub base_backoff: Duration,
    /// Cap on the deterministic part of the delay.
    pub max_backoff: Duration,
    /// Attempts after which a task moves to Failed.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Builds the policy from engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            base_backoff: config.base_backoff,
            max_backoff: config.max_backoff,
            max_attempts: config.max_retry_attempts,
        }
    }

    /// Computes the delay for the given retry count.
    ///
    /// `retry_count` is the value *after* the failure was counted, so the
    /// first retry passes 1. The result is
    /// `min(retry_count x base, cap) + jitter(0, base)`.
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        let deterministic = self
            .base_backoff
            .saturating_mul(retry_count)
            .min(self.max_backoff);
        deterministic + self.jitter()
    }

    /// Decides between another retry and terminal failure.
    ///
    /// `retry_count` is the incremented value; the ceiling check runs after
    /// the increment, so a task observed in the Failed stream always shows
    /// `retry_count >= max_attempts`.
    #[must_use]
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.delay(retry_count))
        }
    }

    fn jitter(&self) -> Duration {
        let bound = self.base_backoff.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound))
    }
}
