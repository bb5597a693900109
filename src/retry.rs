//! Cancellable backoff primitives shared by the gate, the provider client,
//! and the orchestrator.
//!
//! Backoff waits are timers raced against the caller's cancellation token,
//! never unconditional sleeps: cancelling a request must abort an in-flight
//! wait promptly and prevent any further retry from being scheduled.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Delay before retry number `attempt` (1-based): `base · 2^(attempt-1)`.
pub(crate) fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16))
}

/// Sleep for the given backoff, returning `Cancelled` if the token fires first.
pub(crate) async fn backoff_sleep(
    base_ms: u64,
    attempt: u32,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let delay = Duration::from_millis(backoff_delay_ms(base_ms, attempt));
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Race a future against cancellation.
///
/// Network calls run through this so an aborted request drops the in-flight
/// connection instead of waiting out its timeout.
pub(crate) async fn with_cancel<F, T>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double() {
        assert_eq!(backoff_delay_ms(1000, 1), 1000);
        assert_eq!(backoff_delay_ms(1000, 2), 2000);
        assert_eq!(backoff_delay_ms(1000, 3), 4000);
        assert_eq!(backoff_delay_ms(500, 3), 2000);
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        // Absurd attempt numbers must not panic in release or debug builds.
        let d = backoff_delay_ms(u64::MAX, 40);
        assert_eq!(d, u64::MAX);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_sleep() {
        let token = CancellationToken::new();
        token.cancel();
        let err = backoff_sleep(60_000, 3, &token).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn with_cancel_passes_value_through() {
        let token = CancellationToken::new();
        let v = with_cancel(&token, async { 42 }).await.unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn with_cancel_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let err = with_cancel(&token, std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
