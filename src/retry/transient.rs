//! Timeouts, throttling and unavailability

use std::time::Duration;

use rand::Rng;

use super::policy::{RetryDecision, RetryStage};
use crate::errors::QueryError;
use crate::routing::BoxFuture;

/// Exponential backoff with jitter for 408 and 503; 429 waits the
/// server-provided delay when there is one.
#[derive(Debug, Clone)]
pub struct TransientRetryStage {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    attempts: u32,
}

impl TransientRetryStage {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            attempts: 0,
        }
    }

    /// Backoff before jitter for the given attempt (0-based)
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    fn next_delay(&self, error: &QueryError) -> Duration {
        if let QueryError::Throttled {
            retry_after: Some(delay),
            ..
        } = error
        {
            return *delay;
        }
        let base = self.base_backoff(self.attempts);
        let jitter_cap = (base.as_millis() / 4) as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        (base + Duration::from_millis(jitter)).min(self.max_backoff)
    }
}

impl RetryStage for TransientRetryStage {
    fn name(&self) -> &'static str {
        "transient"
    }

    fn should_retry<'a>(&'a mut self, error: &'a QueryError) -> BoxFuture<'a, RetryDecision> {
        Box::pin(async move {
            if !error.is_transient() {
                return RetryDecision::Delegate;
            }
            if self.attempts >= self.max_retries {
                return RetryDecision::NoRetry(None);
            }
            let delay = self.next_delay(error);
            self.attempts += 1;
            RetryDecision::RetryAfter(delay)
        })
    }
}
