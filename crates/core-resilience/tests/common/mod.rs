//! Shared helpers for integration tests

use std::fmt;
use tollgate_core_resilience::ErrorClass;
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Route limiter logs through the test writer.
///
/// Set `RUST_LOG` to change verbosity; defaults to `tollgate_core_resilience=debug`.
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tollgate_core_resilience=debug"));

        let fmt_layer = tracing_fmt::layer()
            .with_test_writer()
            .with_target(false)
            .compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

/// Failure returned by simulated upstream calls
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum UpstreamError {
    Throttled,
    BadRequest(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Throttled => f.write_str("429 rate limit exceeded"),
            UpstreamError::BadRequest(reason) => write!(f, "400 bad request: {}", reason),
        }
    }
}

#[allow(dead_code)]
pub fn classify(error: &UpstreamError) -> ErrorClass {
    match error {
        UpstreamError::Throttled => ErrorClass::Transient,
        UpstreamError::BadRequest(_) => ErrorClass::Fatal,
    }
}
