//! Rate limiter: admission control plus retry with backoff
//!
//! Every attempt of an execution first takes a token from the shared
//! [`TokenBudget`], then runs the caller's work. Transient failures (as judged
//! by the limiter's [`ErrorClassifier`]) are retried after an exponential,
//! jittered delay; fatal failures are returned immediately.
//!
//! ```text
//!            ┌────────────┐ timeout  ┌───────────────┐
//!   start ──▶│ Admitting  │─────────▶│ BudgetTimeout │
//!            └─────┬──────┘          └───────────────┘
//!                  │ token
//!                  ▼
//!            ┌────────────┐   Ok     ┌───────────────┐
//!            │  Running   │─────────▶│   Succeeded   │
//!            └─────┬──────┘          └───────────────┘
//!      transient   │    fatal        ┌───────────────┐
//!   ┌──────────────┴────────────────▶│     Fatal     │
//!   │ attempt < max_retries          └───────────────┘
//!   ▼                                ┌───────────────┐
//! ┌─────────────┐  attempt == max    │   Exhausted   │
//! │ BackingOff  │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ▶└───────────────┘
//! └─────┬───────┘
//!       └──▶ Admitting (next attempt)
//! ```
//!
//! The budget lock is only held while tokens are counted; it is never held
//! across the work itself or any sleep, so a caller sitting in backoff never
//! blocks admission for the others.
//!
//! # Example
//! ```no_run
//! use tollgate_core_resilience::{ErrorClass, RateLimitConfig, RateLimiter};
//!
//! #[derive(Debug)]
//! struct HttpError(u16);
//!
//! impl std::fmt::Display for HttpError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "HTTP {}", self.0)
//!     }
//! }
//!
//! # async fn call_upstream() -> Result<String, HttpError> { Ok(String::new()) }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let limiter = RateLimiter::new(RateLimitConfig::default(), |e: &HttpError| {
//!         if e.0 == 429 || e.0 >= 500 {
//!             ErrorClass::Transient
//!         } else {
//!             ErrorClass::Fatal
//!         }
//!     })?;
//!
//!     let body = limiter.execute(|| call_upstream()).await?;
//!     println!("{}", body);
//!     Ok(())
//! }
//! ```

use crate::backoff::BackoffCalculator;
use crate::classify::{ErrorClassifier, MessageClassifier};
use crate::config::RateLimitConfig;
use crate::error::{ConfigError, RateLimitError};
use crate::retry::{RetryEvent, RetryObserver, RetryResult, RetryState};
use crate::stats::{LimiterCounters, LimiterStats};
use crate::suspend::sleep_or_cancel;
use crate::token_budget::{Admission, TokenBudget};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-execution options
#[derive(Clone, Copy)]
pub struct ExecuteOptions<'a> {
    /// Tokens taken from the budget by each attempt
    pub cost: f64,
    /// Notified before every backoff sleep
    pub observer: Option<&'a dyn RetryObserver>,
    /// Interrupts admission waits and backoff sleeps
    pub cancel: Option<&'a CancellationToken>,
    /// Overrides the configured admission timeout for this execution
    pub admission_timeout: Option<Duration>,
}

impl Default for ExecuteOptions<'_> {
    fn default() -> Self {
        Self {
            cost: 1.0,
            observer: None,
            cancel: None,
            admission_timeout: None,
        }
    }
}

impl<'a> ExecuteOptions<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ExecuteOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("cost", &self.cost)
            .field("observer", &self.observer.is_some())
            .field("cancel", &self.cancel)
            .field("admission_timeout", &self.admission_timeout)
            .finish()
    }
}

/// Admission-controlled retry executor.
///
/// Cheap to clone; clones share the same budget and counters.
pub struct RateLimiter<E> {
    config: Arc<RateLimitConfig>,
    budget: Arc<TokenBudget>,
    backoff: BackoffCalculator,
    classifier: Arc<dyn ErrorClassifier<E>>,
    counters: Arc<LimiterCounters>,
}

impl<E> Clone for RateLimiter<E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            budget: Arc::clone(&self.budget),
            backoff: self.backoff,
            classifier: Arc::clone(&self.classifier),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<E> fmt::Debug for RateLimiter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("budget", &self.budget)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<E: fmt::Display + 'static> RateLimiter<E> {
    /// Limiter that classifies failures by message text
    pub fn with_message_classifier(config: RateLimitConfig) -> Result<Self, ConfigError> {
        Self::new(config, MessageClassifier::new())
    }
}

impl<E> RateLimiter<E> {
    /// Create a limiter with its own token budget
    pub fn new<C>(config: RateLimitConfig, classifier: C) -> Result<Self, ConfigError>
    where
        C: ErrorClassifier<E> + 'static,
    {
        config.validate()?;
        let budget = Arc::new(TokenBudget::from_config(&config));
        Ok(Self::build(config, budget, classifier))
    }

    /// Create a limiter drawing from an existing budget.
    ///
    /// The budget's own capacity and refill rate apply; the config's
    /// `initial_tokens` and `refill_rate` are ignored.
    pub fn with_budget<C>(
        config: RateLimitConfig,
        budget: Arc<TokenBudget>,
        classifier: C,
    ) -> Result<Self, ConfigError>
    where
        C: ErrorClassifier<E> + 'static,
    {
        config.validate()?;
        Ok(Self::build(config, budget, classifier))
    }

    fn build<C>(config: RateLimitConfig, budget: Arc<TokenBudget>, classifier: C) -> Self
    where
        C: ErrorClassifier<E> + 'static,
    {
        Self {
            backoff: BackoffCalculator::from_config(&config),
            config: Arc::new(config),
            budget,
            classifier: Arc::new(classifier),
            counters: Arc::new(LimiterCounters::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn budget(&self) -> &Arc<TokenBudget> {
        &self.budget
    }

    pub fn backoff(&self) -> &BackoffCalculator {
        &self.backoff
    }

    /// Run `work` with admission control and retries, using default options
    pub async fn execute<F, Fut, T>(&self, work: F) -> Result<T, RateLimitError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(work, ExecuteOptions::default()).await
    }

    /// Run `work` with admission control and retries
    pub async fn execute_with<F, Fut, T>(
        &self,
        work: F,
        options: ExecuteOptions<'_>,
    ) -> Result<T, RateLimitError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_detailed(work, options).await.into_result()
    }

    /// Run `work` and report the outcome together with its retry history.
    ///
    /// The same closure is called for every attempt; the limiter never
    /// touches anything it captures. Making repeated calls safe is up to
    /// the caller.
    pub async fn execute_detailed<F, Fut, T>(
        &self,
        work: F,
        options: ExecuteOptions<'_>,
    ) -> RetryResult<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.counters.record_start();

        let mut state = RetryState::new();
        let result = self.run(&work, &options, &mut state).await;

        let attempts_used = match &result {
            Err(RateLimitError::Exhausted { attempts, .. }) => *attempts,
            _ => state.invocations(),
        };
        let history = match &result {
            Err(RateLimitError::Exhausted { history, .. }) => history.clone(),
            _ => state.take_history(),
        };

        let report = RetryResult {
            result,
            attempts_used,
            total_wait: state.cumulative_delay(),
            history,
        };
        self.counters.record_outcome(report.outcome());
        report
    }

    async fn run<F, Fut, T>(
        &self,
        work: &F,
        options: &ExecuteOptions<'_>,
        state: &mut RetryState<E>,
    ) -> Result<T, RateLimitError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_retries = self.config.max_retries;
        let admission_timeout = options
            .admission_timeout
            .unwrap_or(self.config.admission_timeout);

        loop {
            let admission_started = Instant::now();
            match self
                .budget
                .acquire(options.cost, admission_timeout, options.cancel)
                .await
            {
                Admission::Granted => {
                    debug!(
                        attempt = state.attempt(),
                        cost = options.cost,
                        "Admitted by token budget"
                    );
                }
                Admission::TimedOut | Admission::Unsatisfiable => {
                    let available = self.budget.available();
                    warn!(
                        attempt = state.attempt(),
                        cost = options.cost,
                        available = available,
                        "Token budget admission timed out"
                    );
                    return Err(RateLimitError::BudgetTimeout {
                        requested: options.cost,
                        available,
                        waited: admission_started.elapsed(),
                        attempts: state.invocations(),
                    });
                }
                Admission::Cancelled => {
                    debug!(attempt = state.attempt(), "Cancelled during admission");
                    return Err(cancelled(state));
                }
            }

            state.record_invocation();
            let error = match work().await {
                Ok(value) => {
                    if state.attempt() > 0 {
                        debug!(
                            attempts = state.invocations(),
                            waited_ms = state.cumulative_delay().as_millis() as u64,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.classifier.classify(&error).is_transient() {
                debug!(
                    attempt = state.attempt(),
                    "Fatal failure, not retrying"
                );
                return Err(RateLimitError::Fatal(error));
            }

            if state.attempt() >= max_retries {
                warn!(
                    retries = state.attempt(),
                    invocations = state.invocations(),
                    waited_ms = state.cumulative_delay().as_millis() as u64,
                    "Retries exhausted"
                );
                return Err(RateLimitError::Exhausted {
                    attempts: state.attempt(),
                    invocations: state.invocations(),
                    total_wait: state.cumulative_delay(),
                    last_error: error,
                    history: state.take_history(),
                });
            }

            let retry = state.attempt() + 1;
            let delay = self.backoff.next_delay(retry);
            let event = RetryEvent {
                attempt: retry,
                max_attempts: max_retries,
                delay,
                tokens_remaining: self.budget.available(),
                estimated_wait: self
                    .backoff
                    .estimate_total_wait(state.attempt(), max_retries - state.attempt()),
            };

            warn!(
                attempt = retry,
                max_retries = max_retries,
                delay_ms = delay.as_millis() as u64,
                tokens_remaining = event.tokens_remaining,
                "Transient failure, backing off"
            );
            if let Some(observer) = options.observer {
                observer.on_retry(&event);
            }
            state.record_retry(event);
            state.record_transient(error);
            self.counters.record_retry();

            let sleep_started = Instant::now();
            let slept = sleep_or_cancel(delay, options.cancel).await;
            state.record_wait(sleep_started.elapsed().min(delay));
            if slept.is_err() {
                debug!(attempt = retry, "Cancelled during backoff");
                return Err(cancelled(state));
            }
            state.advance();
        }
    }

    /// Counters for this limiter and a snapshot of its budget
    pub fn stats(&self) -> LimiterStats {
        self.counters.snapshot(self.budget.stats())
    }

    /// Refill the budget and zero the counters.
    ///
    /// A budget shared with other limiters is refilled for all of them.
    pub fn reset(&self) {
        self.budget.reset();
        self.counters.reset();
    }
}

fn cancelled<E>(state: &RetryState<E>) -> RateLimitError<E> {
    RateLimitError::Cancelled {
        attempts: state.invocations(),
        total_wait: state.cumulative_delay(),
    }
}
