//! Reconnect backoff for the realtime channel.
//!
//! Additive rather than exponential: every failed connection attempt adds a
//! fixed step to the delay, up to a ceiling. Any successful data frame
//! resets it to zero.

use std::time::Duration;

/// Default step added per failed attempt.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(5);

/// Default maximum delay.
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// Additive reconnect backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    step: Duration,
    ceiling: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    /// Create a backoff adding `step` per failure, capped at `ceiling`.
    pub fn new(step: Duration, ceiling: Duration) -> Self {
        Self {
            step,
            ceiling,
            current: Duration::ZERO,
        }
    }

    /// The delay to wait before the next attempt. Zero until the first failure.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failed attempt and return the delay before the next one.
    pub fn on_failure(&mut self) -> Duration {
        self.current = self.current.saturating_add(self.step).min(self.ceiling);
        self.current
    }

    /// Record a successful data frame.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_STEP, DEFAULT_BACKOFF_CEILING)
    }
}
