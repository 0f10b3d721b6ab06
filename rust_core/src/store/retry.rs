//! Store write retry for transient failures
//!
//! Provides retry with exponential backoff for knowledge store operations.

use super::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempts made for a store write before it is dropped (one retry)
pub const WRITE_ATTEMPTS: u32 = 2;

/// Default base backoff between write attempts
pub const DEFAULT_WRITE_BACKOFF: Duration = Duration::from_millis(100);

/// Execute a store operation, retrying retriable failures.
///
/// Backoff doubles per attempt starting at `base_backoff`.
///
/// # Example
/// ```ignore
/// use teamlink_rust_core::store::retry::{execute_with_retry, WRITE_ATTEMPTS, DEFAULT_WRITE_BACKOFF};
///
/// execute_with_retry(
///     || store.record_outcome(&record),
///     WRITE_ATTEMPTS,
///     DEFAULT_WRITE_BACKOFF,
/// ).await?;
/// ```
pub async fn execute_with_retry<F, Fut, T>(
    mut f: F,
    max_attempts: u32,
    base_backoff: Duration,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && e.is_retriable() => {
                let backoff = base_backoff * 2_u32.pow(attempt - 1);
                warn!(
                    "Store operation failed (attempt {}/{}): {}. Retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
