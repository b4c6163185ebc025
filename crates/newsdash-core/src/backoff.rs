//! Reconnection backoff policy
//!
//! The delay for attempt `k` (counting from 1) is
//! `min(max, base * 2^(k-1))` plus a non-negative jitter of at most
//! `jitter_ratio` of that value, capped again at `max`. Many dashboards losing
//! the same backend therefore spread their retries instead of reconnecting in
//! lockstep. A successful connection resets the attempt counter.

use core::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::BackoffConfig;

/// Attempt counter plus delay calculator
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    attempt: u32,
    rng: StdRng,
}

impl ReconnectPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Policy with a caller-supplied random source
    pub fn with_rng(config: BackoffConfig, rng: StdRng) -> Self {
        Self {
            config,
            attempt: 0,
            rng,
        }
    }

    /// Retries scheduled since the last successful connection
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Forget previous failures; the next delay is the base delay again
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Advance the attempt counter and return the delay to wait before it
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let jitter = if self.config.jitter_ratio > 0.0 {
            self.rng.gen_range(0.0..=1.0)
        } else {
            0.0
        };
        delay_for_attempt(&self.config, self.attempt, jitter)
    }
}

/// Exponential floor for attempt `k`, capped at the max delay
pub fn floor_for_attempt(config: &BackoffConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let raw = config.base_delay_ms.saturating_mul(factor);
    Duration::from_millis(raw.min(config.max_delay_ms))
}

/// Delay for attempt `k` given a jitter sample in `[0, 1]`
pub fn delay_for_attempt(config: &BackoffConfig, attempt: u32, jitter_sample: f64) -> Duration {
    let floor = floor_for_attempt(config, attempt).as_millis() as u64;
    let sample = jitter_sample.clamp(0.0, 1.0);
    let jitter = (floor as f64 * config.jitter_ratio * sample).round() as u64;
    Duration::from_millis(floor.saturating_add(jitter).min(config.max_delay_ms))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            jitter_ratio: 0.25,
        }
    }

    #[test]
    fn test_floor_doubles_until_cap() {
        let config = config();
        assert_eq!(floor_for_attempt(&config, 1), Duration::from_millis(100));
        assert_eq!(floor_for_attempt(&config, 2), Duration::from_millis(200));
        assert_eq!(floor_for_attempt(&config, 4), Duration::from_millis(800));
        assert_eq!(floor_for_attempt(&config, 7), Duration::from_millis(5_000));
        assert_eq!(floor_for_attempt(&config, 200), Duration::from_millis(5_000));
    }

    #[test]
    fn test_jitter_is_bounded_by_ratio_and_cap() {
        let config = config();
        assert_eq!(delay_for_attempt(&config, 1, 0.0), Duration::from_millis(100));
        assert_eq!(delay_for_attempt(&config, 1, 1.0), Duration::from_millis(125));
        assert_eq!(delay_for_attempt(&config, 6, 1.0), Duration::from_millis(4_000));
        assert_eq!(delay_for_attempt(&config, 7, 1.0), Duration::from_millis(5_000));
    }

    #[test]
    fn test_reset_returns_to_base_delay() {
        let mut no_jitter = config();
        no_jitter.jitter_ratio = 0.0;
        let mut policy = ReconnectPolicy::with_rng(no_jitter, StdRng::seed_from_u64(7));

        assert_eq!(policy.next_delay(), Duration::from_millis(100));
        assert_eq!(policy.next_delay(), Duration::from_millis(200));
        assert_eq!(policy.next_delay(), Duration::from_millis(400));
        assert_eq!(policy.attempt(), 3);

        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_attempts_are_unbounded() {
        let mut policy = ReconnectPolicy::with_rng(config(), StdRng::seed_from_u64(1));
        for _ in 0..1_000 {
            assert!(policy.next_delay() <= Duration::from_millis(5_000));
        }
        assert_eq!(policy.attempt(), 1_000);
    }

    proptest! {
        /// Property: base * 2^(k-1) <= delay <= max whenever the floor fits
        /// under the cap
        #[test]
        fn delay_respects_bounds(seed in any::<u64>(), attempts in 1u32..20) {
            let config = config();
            let mut policy = ReconnectPolicy::with_rng(config.clone(), StdRng::seed_from_u64(seed));
            for k in 1..=attempts {
                let delay = policy.next_delay();
                let exact_floor = config.base_delay_ms.saturating_mul(1u64 << (k - 1));
                prop_assert!(delay <= config.max_delay());
                if exact_floor <= config.max_delay_ms {
                    prop_assert!(delay >= Duration::from_millis(exact_floor));
                } else {
                    prop_assert_eq!(delay, config.max_delay());
                }
            }
        }
    }
}
