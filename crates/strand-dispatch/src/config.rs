//! Engine configuration.
//!
//! Every tunable the workers and the retry policy consult lives here as a
//! named field. Defaults suit a small production deployment; operators
//! override individual fields at construction time.

use std::time::Duration;

/// Configuration for the task stream engine and its background workers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum retry attempts before a task is moved to the Failed stream.
    pub max_retry_attempts: u32,

    /// Base unit of the retry backoff; the jitter term is also drawn from
    /// `[0, base_backoff)`.
    pub base_backoff: Duration,

    /// Upper bound on the deterministic part of the retry backoff.
    pub max_backoff: Duration,

    /// How long a task may sit in Processing before the timeout worker
    /// reclaims it.
    pub processing_timeout: Duration,

    /// Poll interval of the dispatch worker over the Ready stream.
    pub dispatch_interval: Duration,

    /// Poll interval of the retry worker over the Retry stream.
    pub retry_interval: Duration,

    /// Poll interval of the timeout worker over the Processing stream.
    pub timeout_interval: Duration,

    /// Interval at which stream-length gauges are republished.
    pub metrics_interval: Duration,

    /// Time budget for a single performer send.
    pub send_timeout: Duration,

    /// Blocking-read bound passed to the store on group reads.
    pub block_timeout: Duration,

    /// Messages fetched per dispatch-worker poll.
    pub dispatch_read_count: usize,

    /// Messages fetched per retry-worker poll.
    pub retry_read_count: usize,

    /// Messages fetched per timeout-worker poll.
    pub timeout_read_count: usize,

    /// Approximate cap on stream length passed to every append.
    pub stream_max_len: usize,

    /// Maximum concurrent outbound performer sends.
    pub dispatch_concurrency: usize,

    /// Buffered submissions that trigger an immediate batch flush.
    pub batch_size: usize,

    /// Interval of the batch flush worker.
    pub batch_interval: Duration,

    /// Decode failures tolerated for one message before it is quarantined
    /// to the Failed stream.
    pub quarantine_ceiling: u32,

    /// Retention of the Completed stream.
    pub completed_ttl: Duration,

    /// Retention of the Failed stream.
    pub failed_ttl: Duration,

    /// Retention of the Retry stream.
    pub retry_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            base_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
            processing_timeout: Duration::from_secs(300),
            dispatch_interval: Duration::from_secs(1),
            retry_interval: Duration::from_secs(5),
            timeout_interval: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            block_timeout: Duration::from_secs(1),
            dispatch_read_count: 10,
            retry_read_count: 10,
            timeout_read_count: 100,
            stream_max_len: 10_000,
            dispatch_concurrency: 32,
            batch_size: 10,
            batch_interval: Duration::from_millis(500),
            quarantine_ceiling: 3,
            completed_ttl: Duration::from_secs(60 * 60),
            failed_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            retry_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry ceiling.
    #[must_use]
    pub const fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the base backoff unit.
    #[must_use]
    pub const fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Sets the Processing-stage time budget.
    #[must_use]
    pub const fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    /// Sets the cap on concurrent outbound performer sends.
    #[must_use]
    pub const fn with_dispatch_concurrency(mut self, limit: usize) -> Self {
        self.dispatch_concurrency = limit;
        self
    }
}
