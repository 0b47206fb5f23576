//! Per-execution retry bookkeeping and progress reporting

use crate::error::RateLimitError;
use std::time::Duration;
use tokio::time::Instant;

/// Emitted once per scheduled retry, before the backoff sleep starts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEvent {
    /// Retry number, starting at 1
    pub attempt: u32,
    /// Configured `max_retries`
    pub max_attempts: u32,
    /// Backoff about to be slept
    pub delay: Duration,
    /// Tokens left in the budget when the retry was scheduled
    pub tokens_remaining: f64,
    /// Non-jittered backoff still ahead if every remaining retry fails,
    /// including this one
    pub estimated_wait: Duration,
}

/// Synchronous progress hook, called inline from the retry loop.
///
/// Implementations must return quickly. Any `Fn(&RetryEvent)` qualifies.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, event: &RetryEvent);
}

impl<F> RetryObserver for F
where
    F: Fn(&RetryEvent) + Send + Sync,
{
    fn on_retry(&self, event: &RetryEvent) {
        self(event)
    }
}

/// Mutable state of one execution. Never shared between executions.
#[derive(Debug)]
pub struct RetryState<E> {
    attempt: u32,
    invocations: u32,
    cumulative_delay: Duration,
    last_error: Option<E>,
    start_time: Instant,
    history: Vec<RetryEvent>,
}

impl<E> RetryState<E> {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            invocations: 0,
            cumulative_delay: Duration::ZERO,
            last_error: None,
            start_time: Instant::now(),
            history: Vec::new(),
        }
    }

    /// Retries scheduled so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Times the work unit has been invoked
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    /// Total time spent in backoff sleeps
    pub fn cumulative_delay(&self) -> Duration {
        self.cumulative_delay
    }

    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    /// Wall time since the execution started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn history(&self) -> &[RetryEvent] {
        &self.history
    }

    pub(crate) fn record_invocation(&mut self) {
        self.invocations += 1;
    }

    pub(crate) fn record_transient(&mut self, error: E) {
        self.last_error = Some(error);
    }

    pub(crate) fn record_retry(&mut self, event: RetryEvent) {
        self.history.push(event);
    }

    pub(crate) fn record_wait(&mut self, slept: Duration) {
        self.cumulative_delay = self.cumulative_delay.saturating_add(slept);
    }

    /// Backoff finished; the next admission belongs to the next attempt
    pub(crate) fn advance(&mut self) {
        self.attempt += 1;
    }

    pub(crate) fn take_history(&mut self) -> Vec<RetryEvent> {
        std::mem::take(&mut self.history)
    }
}

impl<E> Default for RetryState<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// How an execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Success,
    Exhausted,
    BudgetTimeout,
    Fatal,
    Cancelled,
}

/// Full report of an execution: the result plus its retry history
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, RateLimitError<E>>,
    /// Work invocations on success, fatal failure, timeout and cancellation;
    /// retries performed on exhaustion
    pub attempts_used: u32,
    /// Time spent sleeping in backoff
    pub total_wait: Duration,
    /// Every retry scheduled during the execution, in order
    pub history: Vec<RetryEvent>,
}

impl<T, E> RetryResult<T, E> {
    pub fn outcome(&self) -> RetryOutcome {
        match &self.result {
            Ok(_) => RetryOutcome::Success,
            Err(RateLimitError::Exhausted { .. }) => RetryOutcome::Exhausted,
            Err(RateLimitError::BudgetTimeout { .. }) => RetryOutcome::BudgetTimeout,
            Err(RateLimitError::Fatal(_)) => RetryOutcome::Fatal,
            Err(RateLimitError::Cancelled { .. }) => RetryOutcome::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// Delays slept, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.history.iter().map(|event| event.delay).collect()
    }

    pub fn into_result(self) -> Result<T, RateLimitError<E>> {
        self.result
    }
}
