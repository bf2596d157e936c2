//! Retry and polling configuration.
//!
//! Defaults can be overridden from the environment:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `ROLLOUT_RETRY_ATTEMPTS` | status poll attempts |
//! | `ROLLOUT_RETRY_PERIOD_SECS` | seconds between status polls |
//! | `ROLLOUT_DELETE_WAIT_ATTEMPTS` | polls while waiting for a delete to propagate |
//! | `ROLLOUT_DELETE_WAIT_PERIOD_MS` | milliseconds between those polls |
//! | `ROLLOUT_CREATE_BACKOFF_ATTEMPTS` | create attempts after a replace |
//!
//! A value of 0 selects the default for that setting.

use crate::error::ControlError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

// Defaults
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 60;
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_DELETE_WAIT_ATTEMPTS: u32 = 60;
pub const DEFAULT_DELETE_WAIT_PERIOD: Duration = Duration::from_millis(500);
pub const DEFAULT_CREATE_BACKOFF_ATTEMPTS: u32 = 8;

/// Attempts and fixed period for a retry loop.
///
/// Zero in either field means "use the default" once passed through
/// [`RetryPolicy::with_defaults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first
    pub attempts: u32,
    /// Wait between calls
    pub period: Duration,
}

impl RetryPolicy {
    /// Policy with the given attempts and period
    pub const fn new(attempts: u32, period: Duration) -> Self {
        Self { attempts, period }
    }

    /// Replace zero fields with the ones from `defaults`
    #[must_use]
    pub fn with_defaults(self, defaults: RetryPolicy) -> Self {
        Self {
            attempts: if self.attempts == 0 { defaults.attempts } else { self.attempts },
            period: if self.period.is_zero() { defaults.period } else { self.period },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_PERIOD)
    }
}

/// Defaults for waiting on a delete to propagate
pub const DEFAULT_DELETE_WAIT: RetryPolicy =
    RetryPolicy::new(DEFAULT_DELETE_WAIT_ATTEMPTS, DEFAULT_DELETE_WAIT_PERIOD);

/// Exponential backoff schedule for a bounded number of attempts.
///
/// Like [`RetryPolicy`], zero fields mean "use the default" once passed
/// through [`BackoffPolicy::with_defaults`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total calls, including the first
    pub attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Growth factor per attempt; must be finite and at least 1
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Replace zero or unusable fields with the ones from `defaults`
    #[must_use]
    pub fn with_defaults(self, defaults: BackoffPolicy) -> Self {
        Self {
            attempts: if self.attempts == 0 { defaults.attempts } else { self.attempts },
            initial_delay: if self.initial_delay.is_zero() {
                defaults.initial_delay
            } else {
                self.initial_delay
            },
            max_delay: if self.max_delay.is_zero() { defaults.max_delay } else { self.max_delay },
            multiplier: if self.multiplier.is_finite() && self.multiplier >= 1.0 {
                self.multiplier
            } else {
                defaults.multiplier
            },
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CREATE_BACKOFF_ATTEMPTS,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Retry settings used by the resource controllers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutConfig {
    /// Status polling
    pub status: RetryPolicy,
    /// Waiting for a delete to propagate
    pub delete_wait: RetryPolicy,
    /// Recreating an object after deleting the old one
    pub create_backoff: BackoffPolicy,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            status: RetryPolicy::default(),
            delete_wait: DEFAULT_DELETE_WAIT,
            create_backoff: BackoffPolicy::default(),
        }
    }
}

impl RolloutConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControlError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControlError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(attempts) = parse_var(&lookup, "ROLLOUT_RETRY_ATTEMPTS")? {
            config.status.attempts = attempts;
        }
        if let Some(secs) = parse_var(&lookup, "ROLLOUT_RETRY_PERIOD_SECS")? {
            config.status.period = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var(&lookup, "ROLLOUT_DELETE_WAIT_ATTEMPTS")? {
            config.delete_wait.attempts = attempts;
        }
        if let Some(millis) = parse_var(&lookup, "ROLLOUT_DELETE_WAIT_PERIOD_MS")? {
            config.delete_wait.period = Duration::from_millis(millis);
        }
        if let Some(attempts) = parse_var(&lookup, "ROLLOUT_CREATE_BACKOFF_ATTEMPTS")? {
            config.create_backoff.attempts = attempts;
        }
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ControlError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|e| {
            ControlError::BadParameter(format!(
                "{} environment variable is invalid ({:?}): {}",
                name, value, e
            ))
        }),
    }
}
