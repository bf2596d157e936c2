//! # Exponential Backoff
//!
//! Delay generator for retries that should back off quickly, such as
//! recreating an object while the API server is still finishing the delete
//! of its predecessor.
//!
//! Sequence with the default policy: 500ms, 1s, 2s, 4s, 8s, 10s (max), 10s, ...

use crate::config::BackoffPolicy;
use std::time::Duration;

/// Exponential backoff calculator
///
/// Each delay is the previous one multiplied by `multiplier`, capped at
/// `max_delay`. A multiplier below 1 or not finite is treated as 1, which
/// keeps the delay constant. Growth saturates at `max_delay` instead of
/// overflowing.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    /// Backoff starting at `initial`, growing by `multiplier` up to `max`
    #[must_use]
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            initial,
            current: initial.min(max),
            max,
            multiplier,
        }
    }

    /// Backoff following `policy`
    #[must_use]
    pub fn from_policy(policy: &BackoffPolicy) -> Self {
        Self::new(policy.initial_delay, policy.max_delay, policy.multiplier)
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.current.as_secs_f64() * self.multiplier;
        self.current = Duration::try_from_secs_f64(next)
            .map_or(self.max, |next| next.min(self.max));
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_backoff())
    }
}
