//! Token budget: token-bucket admission gate
//!
//! The budget starts full at `capacity` tokens and refills continuously at a
//! fixed rate. Refill is lazy: it is computed from the elapsed time whenever
//! the budget is touched, inside the same critical section as the
//! check-and-decrement, so concurrent callers can never overdraw it.
//!
//! Admission does not depend on the outcome of the admitted work: tokens are
//! never refunded.
//!
//! # Example
//!
//! ```
//! use tollgate_core_resilience::TokenBudget;
//!
//! // Two tokens, refilling at one token per second
//! let budget = TokenBudget::new(2, 60.0);
//!
//! assert!(budget.try_consume(1.0));
//! assert!(budget.try_consume(1.0));
//! assert!(!budget.try_consume(1.0)); // empty until time passes
//! ```

use crate::config::RateLimitConfig;
use crate::suspend::sleep_or_cancel;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Longest single sleep while waiting for tokens
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest single sleep while waiting for tokens
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a waiting acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Tokens were consumed
    Granted,
    /// The timeout elapsed first
    TimedOut,
    /// The cancellation token fired first
    Cancelled,
    /// The request can never be satisfied (larger than capacity, or not a
    /// positive finite amount); returned without waiting
    Unsatisfiable,
}

impl Admission {
    pub fn is_granted(self) -> bool {
        self == Admission::Granted
    }
}

/// Point-in-time view of a budget
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetStats {
    pub capacity: f64,
    pub available: f64,
    /// Refill rate in tokens per minute
    pub refill_rate: f64,
    /// Total tokens handed out since creation or the last reset
    pub tokens_consumed: f64,
    /// Successful `try_consume` calls
    pub granted: u64,
    /// Rejected `try_consume` calls
    pub denied: u64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    tokens_consumed: f64,
    granted: u64,
    denied: u64,
}

impl BucketState {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
            tokens_consumed: 0.0,
            granted: 0,
            denied: 0,
        }
    }

    fn refill(&mut self, capacity: f64, per_second: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * per_second).min(capacity);
        self.last_refill = now;
    }
}

/// Thread-safe token bucket shared by every execution of a limiter
#[derive(Debug)]
pub struct TokenBudget {
    capacity: f64,
    /// Refill rate in tokens per second
    per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBudget {
    /// Create a full budget of `capacity` tokens refilling at `refill_rate`
    /// tokens per minute. Negative or non-finite rates are treated as zero.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity);
        let per_minute = if refill_rate.is_finite() {
            refill_rate.max(0.0)
        } else {
            0.0
        };

        Self {
            capacity,
            per_second: per_minute / 60.0,
            state: Mutex::new(BucketState::full(capacity)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.initial_tokens, config.refill_rate)
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill rate in tokens per minute
    pub fn refill_rate(&self) -> f64 {
        self.per_second * 60.0
    }

    /// Refill, then take `n` tokens if they are available.
    ///
    /// Never waits. Requests larger than the capacity always fail.
    pub fn try_consume(&self, n: f64) -> bool {
        if !self.is_satisfiable(n) {
            return false;
        }

        let mut state = self.state.lock();
        state.refill(self.capacity, self.per_second);

        if state.tokens >= n {
            state.tokens -= n;
            state.tokens_consumed += n;
            state.granted += 1;
            true
        } else {
            state.denied += 1;
            false
        }
    }

    /// Wait up to `timeout` for `n` tokens. Returns `false` on timeout or
    /// when the request can never be satisfied.
    pub async fn wait_and_consume(&self, n: f64, timeout: Duration) -> bool {
        self.acquire(n, timeout, None).await.is_granted()
    }

    /// Wait up to `timeout` for `n` tokens, giving up early if `cancel` fires.
    ///
    /// A timeout too large to add to the current instant (`Duration::MAX`)
    /// waits without a deadline.
    ///
    /// The lock is only held inside `try_consume`; between polls the caller
    /// sleeps for the estimated refill time, bounded by the poll ceiling and
    /// the remaining timeout.
    pub async fn acquire(
        &self,
        n: f64,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Admission {
        if !self.is_satisfiable(n) {
            return Admission::Unsatisfiable;
        }

        // No deadline when the timeout reaches past the end of the clock
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Admission::Cancelled;
            }
            if self.try_consume(n) {
                return Admission::Granted;
            }

            let now = Instant::now();
            let mut wait = self
                .time_until_available(n)
                .unwrap_or(MAX_POLL_INTERVAL)
                .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Admission::TimedOut;
                }
                wait = wait.min(deadline - now);
            }

            if sleep_or_cancel(wait, cancel).await.is_err() {
                return Admission::Cancelled;
            }
        }
    }

    /// Tokens currently available, after refill
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        state.refill(self.capacity, self.per_second);
        state.tokens
    }

    /// Estimated time until `n` tokens are available.
    ///
    /// `None` when the request can never be satisfied: it exceeds the capacity,
    /// or the budget does not refill and holds too few tokens.
    pub fn time_until_available(&self, n: f64) -> Option<Duration> {
        if !self.is_satisfiable(n) {
            return None;
        }

        let available = self.available();
        if available >= n {
            return Some(Duration::ZERO);
        }
        if self.per_second == 0.0 {
            return None;
        }
        Duration::try_from_secs_f64((n - available) / self.per_second).ok()
    }

    /// Restore the budget to full capacity and clear its counters
    pub fn reset(&self) {
        *self.state.lock() = BucketState::full(self.capacity);
    }

    pub fn stats(&self) -> BudgetStats {
        let mut state = self.state.lock();
        state.refill(self.capacity, self.per_second);
        BudgetStats {
            capacity: self.capacity,
            available: state.tokens,
            refill_rate: self.refill_rate(),
            tokens_consumed: state.tokens_consumed,
            granted: state.granted,
            denied: state.denied,
        }
    }

    fn is_satisfiable(&self, n: f64) -> bool {
        n.is_finite() && n > 0.0 && n <= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_initial_tokens() {
        let budget = TokenBudget::new(100, 60.0);
        assert_eq!(budget.capacity(), 100.0);
        assert_eq!(budget.refill_rate(), 60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_tokens() {
        let budget = TokenBudget::new(10, 60.0);

        assert!(budget.try_consume(5.0));
        assert!((budget.available() - 5.0).abs() < 1e-9);

        // Too many: no change
        assert!(!budget.try_consume(10.0));
        assert!((budget.available() - 5.0).abs() < 1e-9);

        assert!(budget.try_consume(5.0));
        assert!(budget.available() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time() {
        // One token per second
        let budget = TokenBudget::new(2, 60.0);
        assert!(budget.try_consume(1.0));
        assert!(budget.try_consume(1.0));
        assert!(!budget.try_consume(1.0));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!budget.try_consume(1.0));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(budget.try_consume(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_limit() {
        let budget = TokenBudget::new(10, 600.0);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(budget.available(), 10.0);
    }

    #[test]
    fn test_oversized_request_fails_immediately() {
        let budget = TokenBudget::new(5, 60.0);
        assert!(!budget.try_consume(6.0));
        assert_eq!(budget.time_until_available(6.0), None);
        assert_eq!(budget.stats().denied, 0);
    }

    #[test]
    fn test_non_positive_requests_rejected() {
        let budget = TokenBudget::new(5, 60.0);
        assert!(!budget.try_consume(0.0));
        assert!(!budget.try_consume(-1.0));
        assert!(!budget.try_consume(f64::NAN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_available() {
        let budget = TokenBudget::new(10, 60.0);
        assert!(budget.try_consume(10.0));

        let wait = budget.time_until_available(5.0).unwrap();
        assert!(wait >= Duration::from_millis(4990) && wait <= Duration::from_millis(5010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_waits_for_refill() {
        let budget = TokenBudget::new(2, 60.0);
        assert!(budget.try_consume(2.0));

        let started = Instant::now();
        let admission = budget.acquire(1.0, Duration::MAX, None).await;

        assert_eq!(admission, Admission::Granted);
        assert!(started.elapsed() >= Duration::from_millis(990));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_still_cancellable() {
        let budget = TokenBudget::new(1, 0.0);
        assert!(budget.try_consume(1.0));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let admission = budget.acquire(1.0, Duration::MAX, Some(&cancel)).await;
        assert_eq!(admission, Admission::Cancelled);
    }

    #[test]
    fn test_zero_refill_never_becomes_available() {
        let budget = TokenBudget::new(1, 0.0);
        assert!(budget.try_consume(1.0));
        assert_eq!(budget.time_until_available(1.0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_and_consume_succeeds_after_refill() {
        let budget = TokenBudget::new(1, 60.0);
        assert!(budget.try_consume(1.0));

        let start = Instant::now();
        assert!(budget.wait_and_consume(1.0, Duration::from_secs(5)).await);
        assert!(start.elapsed() >= Duration::from_millis(990));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_and_consume_times_out() {
        let budget = TokenBudget::new(1, 6.0); // one token every ten seconds
        assert!(budget.try_consume(1.0));

        let start = Instant::now();
        assert!(!budget.wait_and_consume(1.0, Duration::from_secs(2)).await);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_wait_never_sleeps() {
        let budget = TokenBudget::new(3, 60.0);
        let start = Instant::now();
        assert_eq!(
            budget.acquire(4.0, Duration::from_secs(60), None).await,
            Admission::Unsatisfiable
        );
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_cancelled() {
        let budget = Arc::new(TokenBudget::new(1, 0.0));
        assert!(budget.try_consume(1.0));

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let admission = budget
            .acquire(1.0, Duration::from_secs(60), Some(&token))
            .await;
        assert_eq!(admission, Admission::Cancelled);
    }

    #[test]
    fn test_reset_restores_capacity() {
        let budget = TokenBudget::new(10, 0.0);
        assert!(budget.try_consume(9.0));
        budget.reset();

        let stats = budget.stats();
        assert_eq!(stats.available, 10.0);
        assert_eq!(stats.tokens_consumed, 0.0);
        assert_eq!(stats.granted, 0);
    }

    #[test]
    fn test_thread_safety() {
        let budget = Arc::new(TokenBudget::new(1000, 0.0));
        let consumed = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let budget = Arc::clone(&budget);
                let consumed = Arc::clone(&consumed);
                std::thread::spawn(move || {
                    for _ in 0..150 {
                        if budget.try_consume(1.0) {
                            consumed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // Exactly the capacity, never more
        assert_eq!(consumed.load(Ordering::SeqCst), 1000);
        let stats = budget.stats();
        assert_eq!(stats.available, 0.0);
        assert_eq!(stats.granted, 1000);
        assert_eq!(stats.denied, 500);
    }
}
