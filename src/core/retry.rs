//! Bounded retry with exponential backoff.
//!
//! The delay schedule is a plain state machine, independent of whatever is
//! being retried: `next(delay) = min(max, delay * factor)`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling on the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    750
}
fn default_max_delay_ms() -> u64 {
    3000
}
fn default_backoff_multiplier() -> f64 {
    1.6
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait before attempt `attempt + 1` (1-based attempts).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exp as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_progression_caps_at_max() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay_ms: 750,
            max_delay_ms: 3000,
            backoff_multiplier: 1.6,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(750));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1920));
        // 750 * 1.6^3 = 3072, above the cap
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(3000));
    }

    #[test]
    fn test_should_retry_respects_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }
}
