//! Backoff computation for the resilient fetcher
//!
//! Delays grow exponentially with the attempt number, with a base that depends on
//! how the upstream refused the request: `2` for generic failures and explicit rate
//! limiting, `3` for suspected blocks. Jitter is added by the caller (see
//! [`crate::crawler::delay::DelayPolicy::jitter`]) so that this module stays
//! deterministic.

use std::time::Duration;

/// How an attempt failed, for backoff purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Network error, timeout, 5xx or any other non-success status
    Transient,
    /// HTTP 429
    RateLimited,
    /// HTTP 401/403
    Blocked,
}

impl FailureClass {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Blocked,
            _ => Self::Transient,
        }
    }

    /// Exponent base used for this class
    pub fn growth_base(&self) -> f64 {
        match self {
            Self::Blocked => 3.0,
            Self::Transient | Self::RateLimited => 2.0,
        }
    }

    /// Label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate_limited",
            Self::Blocked => "blocked",
        }
    }
}

/// Configuration for exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Base delay multiplied by `growth_base ^ attempt`
    pub base_delay: Duration,

    /// Maximum delay (caps exponential growth and `Retry-After` hints)
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// Create a policy with the given base delay and cap
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay (without jitter) after the `attempt`-th failed attempt, counting from 1
    pub fn delay_for(&self, class: FailureClass, attempt: u32) -> Duration {
        let exponent = attempt.max(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * class.growth_base().powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());

        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    /// Clamp an upstream `Retry-After` hint to the configured cap
    pub fn clamp_hint(&self, hint: Duration) -> Duration {
        hint.min(self.max_delay)
    }
}
