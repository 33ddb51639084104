//! Fixed-delay retries for network fetches

use std::fmt::Display;
use std::future::Future;

use terrahelm_core::RetryPolicy;

use crate::error::SourceError;

/// Errors that know whether another attempt is worthwhile
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        SourceError::is_retryable(self)
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// The operation always runs at least once, even with `max_retries == 0`.
/// Attempts are strictly sequential with `policy.delay` between them; the
/// error of the last attempt is returned. Errors that are not retryable are
/// returned immediately.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && err.is_retryable() => {
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    delay = ?policy.delay,
                    "{} failed, retrying: {}",
                    what,
                    err
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(attempt, "{} failed, giving up: {}", what, err);
                return Err(err);
            }
        }
    }
}
