//! Retry with exponential back-off and jitter for page loads.
//!
//! Marketplace pages fail transiently in a handful of ways: slow loads,
//! bot-check interstitials that render an almost empty page, 429s, and 5xx.
//! Those are retried; everything else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Attempts and back-off for one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always at least 1.
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 2_000,
        }
    }
}

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Timeouts, failed navigations, and blocked pages.
/// - HTTP 429 and 5xx responses.
/// - Network-level failures: timeout, connection reset.
///
/// **Not retriable:** other 4xx statuses, malformed JSON, and configuration
/// problems (bad URLs, patterns, or facet tables).
pub(crate) fn is_retriable(err: &FetchError) -> bool {
    match err {
        FetchError::Timeout { .. }
        | FetchError::Navigation { .. }
        | FetchError::Blocked { .. }
        | FetchError::RateLimited { .. } => true,
        FetchError::UnexpectedStatus { status, .. } => *status >= 500,
        FetchError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        FetchError::Deserialize { .. }
        | FetchError::InvalidUrl { .. }
        | FetchError::MissingFacetTable { .. }
        | FetchError::InvalidPattern { .. } => false,
    }
}

const MAX_DELAY_MS: u64 = 60_000;

/// Runs `operation` up to `policy.max_attempts` times while it fails with a
/// retriable error.
///
/// The sleep before retry `n` is `backoff_ms × 2^(n-1)` ± 25 % jitter, capped
/// at 60 s. A rate-limited response waits at least its `Retry-After`.
/// Non-retriable errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_attempts {
                    return Err(err);
                }
                let jitter = rand::random::<f64>() * 0.5 + 0.75;
                let delay_ms = backoff_delay_ms(policy, attempt, &err, jitter);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "transient fetch error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Delay before the retry that follows failed `attempt`. `jitter` scales the
/// exponential part; `Retry-After` acts as a floor, both capped at 60 s.
fn backoff_delay_ms(policy: RetryPolicy, attempt: u32, err: &FetchError, jitter: f64) -> u64 {
    let computed = policy
        .backoff_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    let capped = computed.min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (capped as f64 * jitter) as u64;

    match err {
        FetchError::RateLimited {
            retry_after_secs, ..
        } => jittered.max(retry_after_secs.saturating_mul(1_000).min(MAX_DELAY_MS)),
        _ => jittered,
    }
}
