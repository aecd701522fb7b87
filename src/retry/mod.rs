//! Bounded exponential backoff for remote calls.
//!
//! Every RPC call the agent makes goes through [`with_backoff`]. Errors that
//! cannot succeed on retry (bad nonce, insufficient funds, a gas estimate
//! that proves the call would revert) are surfaced immediately; everything
//! else is retried with exponential delay until attempts run out.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors tell the executor whether another attempt can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Run `op` up to `policy.max_attempts` times. Non-retryable errors are
/// returned on first sight; retryable ones are returned once attempts are
/// exhausted.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    context: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.base_delay;
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => {
                warn!(context = context, error = %e, "non-retryable error");
                return Err(e);
            }
            Err(e) if attempt == attempts => {
                warn!(
                    context = context,
                    attempt = attempt,
                    error = %e,
                    "retries exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    context = context,
                    attempt = attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * policy.factor).min(policy.max_delay);
            }
        }
    }

    unreachable!("loop always returns on the final attempt")
}
