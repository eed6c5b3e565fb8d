//! Reconnection policy and exponential backoff.

use std::time::Duration;

/// When and how often to retry an unexpectedly closed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; doubled for each further attempt.
    pub base_delay: Duration,
    /// Consecutive failed attempts after which the connector gives up.
    pub max_attempts: u32,
    /// How long a snapshot or command request may stay unanswered.
    pub request_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Attempt counter for one connector.
///
/// The delay before attempt `n` (0-based) is `base_delay * 2^n`. The counter
/// resets when a connection reaches the ready state.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let factor = 1_u32.checked_shl(self.attempts).unwrap_or(u32::MAX);
        self.attempts += 1;
        Some(self.policy.base_delay.saturating_mul(factor))
    }

    /// Attempts scheduled since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
