//! Store retry logic
//!
//! Retries transient SQLite contention errors ("database is locked") with a
//! short exponential backoff. The bound is a small fixed attempt count; any
//! other store error propagates immediately.

use crate::error::{Error, Result};
use std::time::Duration;

/// Maximum attempts for one store operation, including the first
const MAX_ATTEMPTS: u32 = 3;

/// Initial backoff between attempts; doubles each retry
const INITIAL_BACKOFF_MS: u64 = 50;

/// Retry a store operation on transient lock contention.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If a transient lock error and attempts remain: log WARN, backoff, retry
/// 4. Otherwise return the error
pub async fn retry_transient<F, Fut, T>(operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    for attempt in 1..=MAX_ATTEMPTS {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Store operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_transient(&err) || attempt == MAX_ATTEMPTS {
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    error = %err,
                    "Store busy, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
        }
    }

    unreachable!("loop returns on success, non-transient error, or final attempt")
}

fn is_transient(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => {
            let message = db_err.to_string();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        _ => false,
    }
}
