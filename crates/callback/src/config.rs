//! Endpoint configuration and retry policy.

use std::time::Duration;

use crate::mask::EventMask;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One webhook endpoint.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    pub url: String,
    /// Shared secret for the `X-Signature` HMAC. Unsigned when absent.
    pub secret: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub events: EventMask,
}

impl CallbackConfig {
    /// Creates an unsigned endpoint receiving every event.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            events: EventMask::all(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_events(mut self, events: EventMask) -> Self {
        self.events = events;
        self
    }
}

/// Exponential backoff between delivery attempts: `base * 2^attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Hard upper bound on any single backoff.
    pub const CAP: Duration = Duration::from_secs(30);

    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.min(Self::CAP),
        }
    }

    /// Delay to wait after the given (zero-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.min(Self::CAP);
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(cap, |delay| delay.min(cap))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Self::CAP,
        }
    }
}
