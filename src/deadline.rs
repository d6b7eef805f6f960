//! Hard wall-clock bound for async operations.
//!
//! The reconciliation loop must never stall on a slow directory call, so
//! every query is wrapped in [`deadline`]. When the limit passes the caller
//! gets [`DeadlineExceeded`] and moves on; the underlying operation is
//! dropped, not cancelled remotely, so a late response is simply discarded.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The wrapped operation did not settle before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation did not settle within {limit_ms} ms")]
pub struct DeadlineExceeded {
    pub limit_ms: u64,
}

/// Run `operation` with a hard upper bound on wall-clock time.
///
/// The operation's own output (including any error it resolves to) is passed
/// through untouched; only the elapsed deadline is introduced as a new
/// failure mode.
pub async fn deadline<F>(limit: Duration, operation: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| DeadlineExceeded {
            limit_ms: limit.as_millis() as u64,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_operation_passes_through() {
        let result = deadline(Duration::from_millis(100), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_inner_error_is_preserved() {
        let result = deadline(Duration::from_millis(100), async {
            Err::<u32, &str>("directory said no")
        })
        .await;
        assert_eq!(result, Ok(Err("directory said no")));
    }

    #[tokio::test]
    async fn test_slow_operation_trips_the_deadline() {
        let result = deadline(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            1
        })
        .await;
        assert_eq!(result, Err(DeadlineExceeded { limit_ms: 20 }));
    }
}
