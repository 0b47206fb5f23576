//! Limiter configuration
//!
//! A [`RateLimitConfig`] is built once, validated, and then shared read-only
//! by the token budget, the backoff calculator, and the orchestrator.
//!
//! # Example
//!
//! ```
//! use tollgate_core_resilience::RateLimitConfig;
//! use std::time::Duration;
//!
//! let config = RateLimitConfig::from_toml_str(
//!     r#"
//!     initial_tokens = 50
//!     refill_rate = 30.0
//!     max_retries = 3
//!     initial_delay = 0.5
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.initial_tokens, 50);
//! assert_eq!(config.initial_delay, Duration::from_millis(500));
//! // Unset fields keep their defaults
//! assert_eq!(config.max_delay, Duration::from_secs(60));
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for admission control and retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Token budget capacity; the budget starts full
    pub initial_tokens: u32,

    /// Tokens added back to the budget per minute
    pub refill_rate: f64,

    /// Maximum number of retries after transient failures
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,

    /// Upper bound on any single retry delay
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,

    /// Relative jitter applied to each delay, in `[0, 1]`
    pub jitter_factor: f64,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// How long a single admission may wait for a token
    #[serde(with = "duration_secs")]
    pub admission_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            initial_tokens: 1000,
            refill_rate: 100.0,
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.1,
            backoff_multiplier: 2.0,
            admission_timeout: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_initial_tokens(mut self, tokens: u32) -> Self {
        self.initial_tokens = tokens;
        self
    }

    /// Set the refill rate in tokens per minute
    #[must_use]
    pub fn with_refill_rate(mut self, per_minute: f64) -> Self {
        self.refill_rate = per_minute;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Refill rate converted to tokens per second
    pub fn refill_per_second(&self) -> f64 {
        self.refill_rate / 60.0
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_tokens == 0 {
            return Err(invalid("initial_tokens must be positive"));
        }
        if !self.refill_rate.is_finite() || self.refill_rate < 0.0 {
            return Err(invalid("refill_rate must be a non-negative number"));
        }
        if self.max_delay < self.initial_delay {
            return Err(invalid("max_delay must be >= initial_delay"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(invalid("jitter_factor must be in range [0, 1]"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(invalid("backoff_multiplier must be >= 1.0"));
        }
        if self.admission_timeout.is_zero() {
            return Err(invalid("admission_timeout must be positive"));
        }
        Ok(())
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RateLimitConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

/// Durations are written as fractional seconds (`initial_delay = 0.25`)
mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("invalid duration in seconds: {}", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.initial_tokens, 1000);
        assert_eq!(config.refill_rate, 100.0);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.jitter_factor, 0.1);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = RateLimitConfig::new()
            .with_initial_tokens(500)
            .with_refill_rate(50.0)
            .with_max_retries(3)
            .with_initial_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter_factor(0.2)
            .with_backoff_multiplier(1.5);

        assert_eq!(config.initial_tokens, 500);
        assert_eq!(config.refill_rate, 50.0);
        assert_eq!(config.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let cases = [
            (
                RateLimitConfig::new().with_initial_tokens(0),
                "initial_tokens must be positive",
            ),
            (
                RateLimitConfig::new().with_refill_rate(-1.0),
                "refill_rate must be a non-negative number",
            ),
            (
                RateLimitConfig::new()
                    .with_initial_delay(Duration::from_secs(10))
                    .with_max_delay(Duration::from_secs(5)),
                "max_delay must be >= initial_delay",
            ),
            (
                RateLimitConfig::new().with_jitter_factor(1.5),
                "jitter_factor must be in range",
            ),
            (
                RateLimitConfig::new().with_backoff_multiplier(0.5),
                "backoff_multiplier must be >= 1.0",
            ),
            (
                RateLimitConfig::new().with_admission_timeout(Duration::ZERO),
                "admission_timeout must be positive",
            ),
        ];

        for (config, expected) in cases {
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "expected '{}' in '{}'",
                expected,
                err
            );
        }
    }

    #[test]
    fn test_zero_refill_rate_is_allowed() {
        let config = RateLimitConfig::new().with_refill_rate(0.0);
        assert!(config.validate().is_ok());
        assert_eq!(config.refill_per_second(), 0.0);
    }

    #[test]
    fn test_toml_roundtrip_keeps_seconds() {
        let config = RateLimitConfig::new()
            .with_initial_delay(Duration::from_millis(250))
            .with_admission_timeout(Duration::from_secs(5));

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("initial_delay = 0.25"));

        let parsed = RateLimitConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_toml_rejects_invalid_values() {
        let err = RateLimitConfig::from_toml_str("jitter_factor = 2.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RateLimitConfig::from_toml_str("initial_delay = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "initial_tokens = 10").unwrap();
        writeln!(file, "refill_rate = 600.0").unwrap();
        writeln!(file, "max_delay = 8.0").unwrap();

        let config = RateLimitConfig::from_file(file.path()).unwrap();
        assert_eq!(config.initial_tokens, 10);
        assert_eq!(config.refill_per_second(), 10.0);
        assert_eq!(config.max_delay, Duration::from_secs(8));
    }

    #[test]
    fn test_from_missing_file() {
        let err = RateLimitConfig::from_file("/nonexistent/tollgate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
