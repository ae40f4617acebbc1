use crate::core::error::RateResult;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async rate operation with configurable attempts and delays
///
/// Only transient failures (network errors) are retried; a malformed provider
/// response or a storage failure is returned immediately.
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error from the last attempt
pub async fn with_retry<F, Fut, T>(mut operation: F, retries: usize, delay_ms: u64) -> RateResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RateResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries || !err.is_transient() {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
