//! Tollgate Core Resilience: Pure-logic admission control and retry
//!
//! # Overview
//!
//! This crate keeps callers of a rate-limited service inside its quota and
//! rides out the throttling responses it sends back anyway. It includes:
//!
//! - **Token Budget**: Thread-safe token bucket with lazy continuous refill
//! - **Backoff Calculator**: Exponential delay schedule with symmetric jitter
//! - **Rate Limiter**: Admits each attempt through the budget, classifies
//!   failures, and retries transient ones with backoff
//! - **Sliding Window Counter**: Hard cap on requests within a trailing window
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Network protocols (HTTP, gRPC)
//! - Which service is being called or what its errors look like
//! - Application-specific concerns
//!
//! Whether a failure is worth retrying is decided by an [`ErrorClassifier`]
//! supplied by the caller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ execute(work)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Rate Limiter                      │  ← Retry orchestration
//! │  (classify, back off, report progress)  │
//! └──────┬──────────────────────┬───────────┘
//!        │ every attempt        │ transient failure
//!        ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │  Token Budget    │   │ Backoff          │
//! │  (shared bucket) │   │ Calculator       │
//! └──────┬───────────┘   └──────────────────┘
//!        │ admitted
//!        ▼
//!   External Service
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use tollgate_core_resilience::prelude::*;
//! use std::time::Duration;
//!
//! # async fn fetch() -> Result<String, String> { Ok(String::new()) }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RateLimitConfig::new()
//!     .with_initial_tokens(10)
//!     .with_refill_rate(600.0)
//!     .with_max_retries(3)
//!     .with_initial_delay(Duration::from_millis(500));
//!
//! // Retries anything whose message looks like a throttling response
//! let limiter: RateLimiter<String> = RateLimiter::with_message_classifier(config)?;
//!
//! let report = limiter
//!     .execute_detailed(|| fetch(), ExecuteOptions::default())
//!     .await;
//! println!("{:?} after {} attempts", report.outcome(), report.attempts_used);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;
pub mod rate_limiter;
pub mod retry;
pub mod sliding_window;
pub mod stats;
mod suspend;
pub mod token_budget;

// Re-export main types for convenience
pub use backoff::BackoffCalculator;
pub use classify::{ErrorClass, ErrorClassifier, MessageClassifier, DEFAULT_TRANSIENT_INDICATORS};
pub use config::RateLimitConfig;
pub use error::{ConfigError, RateLimitError, RateLimitResult};
pub use rate_limiter::{ExecuteOptions, RateLimiter};
pub use retry::{RetryEvent, RetryObserver, RetryOutcome, RetryResult, RetryState};
pub use sliding_window::SlidingWindowCounter;
pub use stats::LimiterStats;
pub use token_budget::{Admission, BudgetStats, TokenBudget};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use tollgate_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::backoff::BackoffCalculator;
    pub use super::classify::{ErrorClass, ErrorClassifier, MessageClassifier};
    pub use super::config::RateLimitConfig;
    pub use super::error::{RateLimitError, RateLimitResult};
    pub use super::rate_limiter::{ExecuteOptions, RateLimiter};
    pub use super::retry::{RetryEvent, RetryObserver, RetryOutcome, RetryResult};
    pub use super::token_budget::TokenBudget;
}
