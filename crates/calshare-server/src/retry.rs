//! Bounded retry with exponential backoff for transient remote failures.

use std::future::Future;

use tracing::warn;

use calshare_google::ApiResult;

use crate::config::RetryConfig;

/// Runs `operation` until it succeeds, fails permanently, or the attempt
/// budget is exhausted. Only errors whose [`ApiError::is_retryable`] is
/// true are retried; everything else is returned immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    what: &str,
    mut operation: F,
) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut failures = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && failures + 1 < policy.max_attempts => {
                failures += 1;
                let delay = policy.delay(failures);
                warn!(
                    operation = what,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
