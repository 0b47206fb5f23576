//! Error types for admission-controlled retry
//!
//! [`RateLimitError`] is generic over the caller's own error type `E`. Fatal
//! failures are handed back unchanged inside [`RateLimitError::Fatal`];
//! transient failures only surface once the retry budget is spent, as the
//! `last_error` of [`RateLimitError::Exhausted`].

use crate::retry::RetryEvent;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias for limiter executions
pub type RateLimitResult<T, E> = Result<T, RateLimitError<E>>;

/// Terminal outcome of an execution that did not succeed
#[derive(Error, Debug)]
pub enum RateLimitError<E> {
    /// No token could be acquired within the admission timeout.
    ///
    /// No work was attempted in the admission round that timed out, so the
    /// whole execution is safe to retry externally.
    #[error(
        "Token budget timeout: needed {requested} token(s), {available:.2} available after waiting {waited:?}"
    )]
    BudgetTimeout {
        requested: f64,
        available: f64,
        waited: Duration,
        /// Work invocations completed before admission failed
        attempts: u32,
    },

    /// The classifier marked the failure as not worth retrying
    #[error("{0}")]
    Fatal(E),

    /// Every allowed retry failed with a transient error
    #[error(
        "Retries exhausted after {attempts} retries ({invocations} calls, {total_wait:?} waited): {last_error}"
    )]
    Exhausted {
        /// Retries performed; equals the configured `max_retries`
        attempts: u32,
        /// Number of times the work unit was invoked
        invocations: u32,
        total_wait: Duration,
        last_error: E,
        history: Vec<RetryEvent>,
    },

    /// The caller's cancellation token fired while suspended
    #[error("Execution cancelled after {attempts} attempt(s), {total_wait:?} waited")]
    Cancelled { attempts: u32, total_wait: Duration },
}

impl<E> RateLimitError<E> {
    pub fn is_budget_timeout(&self) -> bool {
        matches!(self, RateLimitError::BudgetTimeout { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RateLimitError::Fatal(_))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RateLimitError::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RateLimitError::Cancelled { .. })
    }

    /// Attempt count carried by the error (zero for fatal failures)
    pub fn attempts(&self) -> u32 {
        match self {
            RateLimitError::BudgetTimeout { attempts, .. }
            | RateLimitError::Exhausted { attempts, .. }
            | RateLimitError::Cancelled { attempts, .. } => *attempts,
            RateLimitError::Fatal(_) => 0,
        }
    }

    /// The underlying work failure, if this error carries one
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RateLimitError::Fatal(e) => Some(e),
            RateLimitError::Exhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }

    /// Unwrap into the caller's error, if this error carries one
    pub fn into_inner(self) -> Option<E> {
        match self {
            RateLimitError::Fatal(e) => Some(e),
            RateLimitError::Exhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

/// Errors raised while building or loading a [`RateLimitConfig`](crate::RateLimitConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
