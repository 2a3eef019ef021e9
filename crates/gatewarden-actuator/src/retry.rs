//! Retry policy and backoff schedule.
//!
//! The schedule is an explicit state machine (attempt count in, next delay
//! out) so retry behavior is deterministic and testable without real I/O or
//! a live clock.

use std::time::Duration;

/// Bounds for the actuation retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the initial one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Cap applied to the exponential backoff.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 10_000,
        }
    }
}

/// Tracks attempts against a [`RetryPolicy`] and yields backoff delays.
///
/// Delays double on each failure, starting at `base_delay_ms` and clamped to
/// `max_delay_ms`.
#[derive(Debug)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts_made: u32,
}

impl RetrySchedule {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts_made: 0,
        }
    }

    /// Number of attempts recorded so far.
    #[must_use]
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once the
    /// attempt budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts_made += 1;
        if self.attempts_made >= self.policy.max_attempts {
            return None;
        }

        // base * 2^(failures - 1), clamped. Shift saturates on absurd counts.
        let exponent = self.attempts_made.saturating_sub(1).min(63);
        let delay_ms = self
            .policy
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.policy.max_delay_ms);

        Some(Duration::from_millis(delay_ms))
    }
}
