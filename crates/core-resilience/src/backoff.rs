//! Exponential backoff with bounded jitter
//!
//! Delays grow geometrically from `initial_delay` and are capped at
//! `max_delay`. Each delay is then perturbed by up to `jitter_factor` of its
//! own size in either direction so that independent callers drift apart
//! instead of retrying in lockstep.
//!
//! # Example
//!
//! ```
//! use tollgate_core_resilience::{BackoffCalculator, RateLimitConfig};
//! use std::time::Duration;
//!
//! let config = RateLimitConfig::new()
//!     .with_initial_delay(Duration::from_secs(1))
//!     .with_max_delay(Duration::from_secs(8))
//!     .with_jitter_factor(0.0);
//!
//! let backoff = BackoffCalculator::from_config(&config);
//! assert_eq!(backoff.next_delay(1), Duration::from_secs(1));
//! assert_eq!(backoff.next_delay(3), Duration::from_secs(4));
//! assert_eq!(backoff.next_delay(10), Duration::from_secs(8));
//! ```

use crate::config::RateLimitConfig;
use rand::Rng;
use std::time::Duration;

/// Stateless delay schedule derived from a [`RateLimitConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffCalculator {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl BackoffCalculator {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.initial_delay,
            config.max_delay,
            config.backoff_multiplier,
            config.jitter_factor,
        )
    }

    /// Delay before retry number `attempt` (1-based), jittered with the thread RNG
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, &mut rand::rng())
    }

    /// Same as [`next_delay`](Self::next_delay) with a caller-supplied RNG
    pub fn next_delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let raw = self.raw_secs(attempt);
        if raw == 0.0 || self.jitter_factor == 0.0 {
            return self.capped(raw);
        }

        let jitter = raw * self.jitter_factor * rng.random_range(-1.0..=1.0);
        let delay = (raw + jitter).clamp(0.0, self.max_delay.as_secs_f64());
        self.capped(delay)
    }

    /// Non-jittered delay for retry number `attempt`; zero for attempt 0
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.capped(self.raw_secs(attempt))
    }

    /// Sum of the non-jittered delays for the next `remaining` retries,
    /// starting after retry `completed`
    pub fn estimate_total_wait(&self, completed: u32, remaining: u32) -> Duration {
        (1..=remaining)
            .map(|offset| self.base_delay(completed.saturating_add(offset)))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Seconds to a `Duration`, never above `max_delay`.
    ///
    /// `max_delay.as_secs_f64()` can round up past the largest `Duration`,
    /// in which case the cap itself is returned.
    fn capped(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    fn raw_secs(&self, attempt: u32) -> f64 {
        if attempt == 0 {
            return 0.0;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let raw = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();

        // 0 * inf is NaN when initial_delay is zero
        if raw.is_nan() {
            0.0
        } else {
            raw.min(cap)
        }
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
