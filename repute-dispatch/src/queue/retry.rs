//! Retry budget and backoff between attempts

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Calculate the delay before the next attempt using exponential backoff with jitter
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
///
/// # Arguments
/// * `attempt` - The attempt that just failed (1-indexed)
/// * `base_delay_ms` - Base delay in milliseconds
/// * `max_delay_ms` - Maximum delay in milliseconds
/// * `jitter_factor` - Jitter factor (e.g., 0.2 for ±20%)
pub fn calculate_retry_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_ms
    } else {
        base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(max_delay_ms)
    };

    if delay == 0 || !jitter_factor.is_finite() || jitter_factor <= 0.0 {
        return Duration::from_millis(delay);
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let jitter_range = (delay as f64) * jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        ((delay as f64) + jitter).max(0.0) as u64
    };

    Duration::from_millis(jittered)
}

/// Retry budget attached to every task at enqueue time
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (in milliseconds).
    ///
    /// Default: 1000 (1 second)
    #[serde(default = "defaults::base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    /// Upper bound on the delay between attempts (in milliseconds).
    ///
    /// Default: 60000 (1 minute)
    #[serde(default = "defaults::max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Randomisation applied to every delay, ±`retry_jitter_factor`.
    ///
    /// Default: 0.2 (±20%)
    #[serde(default = "defaults::retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_retry_delay_ms: defaults::base_retry_delay_ms(),
            max_retry_delay_ms: defaults::max_retry_delay_ms(),
            retry_jitter_factor: defaults::retry_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, `max_attempts` times in total
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_retry_delay_ms: 0,
            max_retry_delay_ms: 0,
            retry_jitter_factor: 0.0,
        }
    }

    /// Delay before the attempt that follows attempt number `attempt`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_retry_delay(
            attempt,
            self.base_retry_delay_ms,
            self.max_retry_delay_ms,
            self.retry_jitter_factor,
        )
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_retry_delay_ms() -> u64 {
        1000
    }

    pub const fn max_retry_delay_ms() -> u64 {
        60_000
    }

    pub const fn retry_jitter_factor() -> f64 {
        0.2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_without_jitter() {
        assert_eq!(calculate_retry_delay(1, 1000, 60_000, 0.0), Duration::from_secs(1));
        assert_eq!(calculate_retry_delay(2, 1000, 60_000, 0.0), Duration::from_secs(2));
        assert_eq!(calculate_retry_delay(3, 1000, 60_000, 0.0), Duration::from_secs(4));
        assert_eq!(
            calculate_retry_delay(20, 1000, 60_000, 0.0),
            Duration::from_secs(60),
            "High attempt number should be capped at max_delay"
        );
        assert_eq!(
            calculate_retry_delay(100, 1000, 60_000, 0.0),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            let delay = calculate_retry_delay(2, 1000, 60_000, 0.2).as_millis();
            assert!((1600..=2400).contains(&delay), "Delay {delay}ms out of range");
        }
    }

    #[test]
    fn immediate_policy() {
        let policy = RetryPolicy::immediate(3);

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::ZERO);
        assert_eq!(policy.delay_after(5), Duration::ZERO);
    }

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_retry_delay_ms, 1000);
        assert_eq!(policy.max_retry_delay_ms, 60_000);
    }
}
