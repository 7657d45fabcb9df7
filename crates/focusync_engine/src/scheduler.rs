//! Coalescing debounce and retry backoff timers.
//!
//! Both types are plain state: they compute deadlines from the instants they
//! are given and never sleep themselves. The syncer's run loop sleeps until
//! the earliest deadline.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Trailing-edge debounce with an optional max-wait cap.
///
/// Every [`request`](Self::request) restarts the quiet window. When a
/// max-wait is set, the deadline never moves past `first_request + max_wait`,
/// so a continuous stream of edits still gets pushed.
#[derive(Debug, Clone)]
pub struct CoalescingScheduler {
    window: Duration,
    max_wait: Option<Duration>,
    first_request: Option<Instant>,
    deadline: Option<Instant>,
    coalesced: u64,
}

impl CoalescingScheduler {
    /// Creates an idle scheduler.
    pub fn new(window: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            window,
            max_wait,
            first_request: None,
            deadline: None,
            coalesced: 0,
        }
    }

    /// Registers a request at `now` and returns the new deadline.
    pub fn request(&mut self, now: Instant) -> Instant {
        if self.deadline.is_some() {
            self.coalesced += 1;
        }
        let first = *self.first_request.get_or_insert(now);
        let mut deadline = now + self.window;
        if let Some(max_wait) = self.max_wait {
            deadline = deadline.min(first + max_wait);
        }
        self.deadline = Some(deadline);
        deadline
    }

    /// Schedules a firing at exactly `at`, ignoring the window.
    ///
    /// Used to re-arm after a failure with a backoff delay.
    pub fn schedule_at(&mut self, at: Instant) {
        self.first_request.get_or_insert(at);
        self.deadline = Some(at);
    }

    /// Returns the pending deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if a firing is pending.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consumes the pending firing if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.cancel();
                true
            }
            _ => false,
        }
    }

    /// Drops any pending firing.
    pub fn cancel(&mut self) {
        self.first_request = None;
        self.deadline = None;
    }

    /// Number of requests that were folded into an already pending firing.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

/// Failure counter with an exponential retry deadline.
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    failures: u32,
    retry_at: Option<Instant>,
    exhausted: bool,
}

impl Backoff {
    /// Records a failure at `now`.
    ///
    /// Returns the delay until the automatic retry, or `None` when the retry
    /// budget is spent. An exhausted backoff stays blocked until [`reset`](Self::reset).
    pub fn record_failure(&mut self, retry: &RetryConfig, now: Instant) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures < retry.max_attempts {
            let delay = delay_after(retry, self.failures);
            self.retry_at = Some(now + delay);
            Some(delay)
        } else {
            self.retry_at = None;
            self.exhausted = true;
            None
        }
    }

    /// Clears the failure history. Called on success and on external triggers.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns true if an attempt may start at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        !self.exhausted && self.retry_at.map_or(true, |at| at <= now)
    }

    /// Returns true if the retry budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Pending retry deadline.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Delay before the retry that follows `failures` consecutive failures.
///
/// `initial_delay * multiplier^(failures - 1)`, capped at `max_delay`, then
/// stretched by up to 25% when jitter is on.
fn delay_after(retry: &RetryConfig, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    let growth = retry.multiplier.max(1).saturating_pow(exponent);
    let delay = retry
        .initial_delay
        .checked_mul(growth)
        .unwrap_or(retry.max_delay)
        .min(retry.max_delay);
    if retry.jitter {
        delay + (delay / 4).mul_f64(rand::thread_rng().gen::<f64>())
    } else {
        delay
    }
}
