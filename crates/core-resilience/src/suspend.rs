//! Cancellable suspension shared by admission waits and backoff sleeps

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a suspension ended early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interrupted;

/// Sleep for `duration`, or until `cancel` fires.
///
/// An already-cancelled token returns immediately without sleeping.
pub(crate) async fn sleep_or_cancel(
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), Interrupted> {
    match cancel {
        Some(token) => {
            if token.is_cancelled() {
                return Err(Interrupted);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Interrupted),
                _ = tokio::time::sleep(duration) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}
