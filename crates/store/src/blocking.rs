//! Bounded execution of blocking filesystem work.

use std::time::{Duration, Instant};

use crate::error::StoreError;

/// Run `f` on the blocking pool and give up after `timeout`.
///
/// A timed-out closure keeps running on its thread; the caller just stops
/// waiting and treats the operation as failed.
pub(crate) async fn run_with_timeout<T, F>(
    operation: &str,
    timeout: Duration,
    f: F,
) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let start = Instant::now();
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(StoreError::Task(join_error.to_string())),
        Err(_elapsed) => Err(StoreError::Timeout {
            operation: operation.to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
