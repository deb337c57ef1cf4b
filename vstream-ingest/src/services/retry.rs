//! AI retry policy
//!
//! Bounded exponential backoff around the AI dependency. The parameters are
//! contractual constants, not configuration:
//!
//! - at most [`MAX_ATTEMPTS`] attempts
//! - backoff between attempts doubles from [`INITIAL_BACKOFF`] (1, 2, 4, 8 s)
//! - a cumulative deadline of [`CUMULATIVE_DEADLINE`] across all attempts
//!   and sleeps; a sleep that would cross it abandons the retry
//! - each attempt is cut off after [`ATTEMPT_TIMEOUT`], with the elapsed
//!   time still counting against the cumulative deadline
//!
//! The policy knows nothing about call state; the engine interprets the
//! outcome.

use crate::services::ai_client::AiError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const MAX_ATTEMPTS: u32 = 5;
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const CUMULATIVE_DEADLINE: Duration = Duration::from_secs(60);
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `operation` until it succeeds or the policy is exhausted.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    mut operation: F,
) -> Result<T, AiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AiError>>,
{
    let started = Instant::now();
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        match tokio::time::timeout(ATTEMPT_TIMEOUT, operation()).await {
            Ok(Ok(result)) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(result);
            }
            Ok(Err(err)) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Attempt failed"
                );
            }
            Err(_) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    timeout_secs = ATTEMPT_TIMEOUT.as_secs(),
                    "Attempt timed out"
                );
            }
        }

        if attempt == MAX_ATTEMPTS {
            break;
        }

        // Abandon rather than sleep past the cumulative deadline
        if started.elapsed() + backoff >= CUMULATIVE_DEADLINE {
            warn!(
                operation = operation_name,
                attempt,
                elapsed_secs = started.elapsed().as_secs(),
                deadline_secs = CUMULATIVE_DEADLINE.as_secs(),
                "Cumulative deadline reached, abandoning retry"
            );
            return Err(AiError::Unavailable(format!(
                "deadline exceeded after {} attempts",
                attempt
            )));
        }

        warn!(
            operation = operation_name,
            attempt,
            backoff_secs = backoff.as_secs(),
            "Retrying after backoff"
        );
        tokio::time::sleep(backoff).await;
        backoff *= 2;
    }

    Err(AiError::Unavailable(format!(
        "no response after {} attempts",
        MAX_ATTEMPTS
    )))
}
