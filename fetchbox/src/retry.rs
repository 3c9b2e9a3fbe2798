//! Retry with fixed backoff.

use std::future::Future;
use std::time::Duration;

use fetchbox_core::{CacheKey, RequestError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dedup::CANCELLED_REASON;

/// Retry bookkeeping for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    budget: u32,
    attempts: u32,
    delay: Duration,
}

impl RetryState {
    /// Allows `budget` retries, each preceded by `delay`.
    pub fn new(budget: u32, delay: Duration) -> Self {
        Self {
            budget,
            attempts: 0,
            delay,
        }
    }

    /// Retries issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay inserted before each retry.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether `err` is retried. Cancellations never are.
    pub fn should_retry(&self, err: &RequestError) -> bool {
        !err.is_cancel() && self.attempts < self.budget
    }
}

/// Re-issues a failed request until it succeeds or the retry budget runs out.
///
/// `err` is the failure of the initial attempt. Each retry waits the fixed
/// delay and then calls `resend`. Once the budget is spent the last failure is
/// returned unchanged. Cancelling `token` during a delay aborts with
/// [`RequestError::Cancelled`].
pub async fn again_request<T, F, Fut>(
    key: &CacheKey,
    mut err: RequestError,
    state: &mut RetryState,
    token: &CancellationToken,
    mut resend: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    while state.should_retry(&err) {
        state.attempts += 1;
        debug!(
            %key,
            attempt = state.attempts,
            budget = state.budget,
            delay = ?state.delay,
            error = %err,
            "Retrying request"
        );
        crate::metrics::record_retry();

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(RequestError::cancelled(key.clone(), CANCELLED_REASON));
            }
            _ = tokio::time::sleep(state.delay) => {}
        }

        match resend().await {
            Ok(value) => return Ok(value),
            Err(next) => err = next,
        }
    }
    Err(err)
}
