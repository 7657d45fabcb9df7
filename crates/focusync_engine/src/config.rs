//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration shared by every syncer of a coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last local change before a push runs.
    pub debounce_window: Duration,
    /// Upper bound on how long continuous edits may postpone a push.
    /// `None` keeps the debounce purely trailing-edge.
    pub debounce_max_wait: Option<Duration>,
    /// Bound on each individual remote call.
    pub request_timeout: Duration,
    /// Maximum records per upsert call.
    pub upsert_batch_size: usize,
    /// Maximum IDs per delete call.
    pub delete_batch_size: usize,
    /// Retry configuration for failed pulls, pushes and deletes.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            debounce_window: Duration::from_millis(400),
            debounce_max_wait: None,
            request_timeout: Duration::from_secs(30),
            upsert_batch_size: 500,
            delete_batch_size: 500,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Caps how long a burst of edits can postpone a push.
    pub fn with_debounce_max_wait(mut self, max_wait: Duration) -> Self {
        self.debounce_max_wait = Some(max_wait);
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the upsert batch size. Zero is treated as one.
    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size.max(1);
        self
    }

    /// Sets the delete batch size. Zero is treated as one.
    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Automatic retry policy for failed remote calls.
///
/// A failed pull, push or delete is retried after an exponentially growing
/// delay until `max_attempts` calls in a row have failed. After that the
/// operation waits for the next external trigger (session event, local
/// change or refresh).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Calls allowed per operation before giving up, the first one included.
    pub max_attempts: u32,
    /// Delay before the first automatic retry.
    pub initial_delay: Duration,
    /// Ceiling for a single delay, before jitter.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: u32,
    /// Stretch each delay by a random amount of up to a quarter.
    pub jitter: bool,
}

impl RetryConfig {
    /// A policy allowing `max_attempts` calls, starting at 500 ms and
    /// doubling up to one minute.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            jitter: true,
        }
    }

    /// A policy that never retries on its own.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
            jitter: false,
        }
    }

    /// Sets the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay ceiling.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor. Zero is treated as one.
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}
