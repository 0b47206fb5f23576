//! Failure classification
//!
//! The orchestrator never looks inside a work failure. It asks an
//! [`ErrorClassifier`] for a verdict and acts on that alone: transient
//! failures are retried with backoff, fatal ones are returned immediately.
//!
//! Any `Fn(&E) -> ErrorClass` is a classifier:
//!
//! ```
//! use tollgate_core_resilience::{ErrorClass, ErrorClassifier};
//!
//! let classify = |status: &u16| match status {
//!     429 | 503 => ErrorClass::Transient,
//!     _ => ErrorClass::Fatal,
//! };
//!
//! assert_eq!(classify.classify(&429), ErrorClass::Transient);
//! assert_eq!(classify.classify(&401), ErrorClass::Fatal);
//! ```

use std::fmt::Display;

/// Verdict on a single work failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying after a backoff
    Transient,
    /// Retrying cannot help; fail fast
    Fatal,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        self == ErrorClass::Transient
    }
}

/// Maps a work failure to a retry verdict
pub trait ErrorClassifier<E>: Send + Sync {
    fn classify(&self, error: &E) -> ErrorClass;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(&E) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &E) -> ErrorClass {
        self(error)
    }
}

/// Phrases that mark a failure message as a rate-limit or overload signal
pub const DEFAULT_TRANSIENT_INDICATORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "429",
    "throttled",
    "quota exceeded",
    "retry",
    "temporarily unavailable",
    "timeout",
    "timed out",
];

/// Classifies failures by searching their `Display` text for known phrases.
///
/// Matching is case-insensitive. Anything that matches no indicator is fatal.
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    indicators: Vec<String>,
}

impl MessageClassifier {
    /// Classifier using [`DEFAULT_TRANSIENT_INDICATORS`]
    pub fn new() -> Self {
        Self::with_indicators(DEFAULT_TRANSIENT_INDICATORS.iter().copied())
    }

    pub fn with_indicators<I, S>(indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            indicators: indicators
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }
}

impl Default for MessageClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Display> ErrorClassifier<E> for MessageClassifier {
    fn classify(&self, error: &E) -> ErrorClass {
        let message = error.to_string().to_lowercase();
        if self.indicators.iter().any(|i| message.contains(i.as_str())) {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}
