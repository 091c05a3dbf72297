// Retry logic for install-time fetches
// Author: kelexine (https://github.com/kelexine)

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tracing::debug;

/// Status used for failures that never produced an HTTP response.
pub const TRANSPORT_FAILURE: u16 = 0;

/// Create exponential backoff configuration for retries
pub fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(250),    // Start at 250ms
        initial_interval: Duration::from_millis(250),
        randomization_factor: 0.3,                        // Add jitter
        multiplier: 2.0,                                  // Double each time
        max_interval: Duration::from_secs(5),             // Cap at 5s
        max_elapsed_time: Some(Duration::from_secs(30)),  // Give up after 30s
        ..Default::default()
    }
}

/// Determine if a failure is worth retrying
pub fn is_retryable(status: u16) -> bool {
    matches!(status, TRANSPORT_FAILURE | 408 | 429 | 500 | 502 | 503 | 504)
}

/// Execute operation with exponential backoff.
/// - Retries transport failures and transient statuses only
/// - Gives up after `max_attempts` attempts or when the backoff is exhausted
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, (u16, String)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, (u16, String)>>,
{
    let mut backoff = create_backoff();
    let mut attempt = 0;
    let max_attempts = max_attempts.max(1);

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err((status, error_body)) => {
                if !is_retryable(status) || attempt >= max_attempts {
                    // Non-retryable error or max attempts reached
                    return Err((status, error_body));
                }

                let Some(delay) = backoff.next_backoff() else {
                    return Err((status, error_body));
                };
                debug!(
                    "{} failed with {} (attempt {}), retrying after {}ms",
                    operation_name,
                    status,
                    attempt,
                    delay.as_millis()
                );

                // Wait before retry
                tokio::time::sleep(delay).await;
            }
        }
    }
}
