//! Stale collection name cache recovery

use std::time::Duration;

use super::policy::{RetryDecision, RetryStage};
use crate::errors::QueryError;
use crate::query::request::FeedRequest;
use crate::routing::BoxFuture;

/// Retries `410/1000` once, forcing a name cache refresh on the retry
#[derive(Debug, Clone, Default)]
pub struct InvalidPartitionRetryStage {
    retried: bool,
}

impl InvalidPartitionRetryStage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RetryStage for InvalidPartitionRetryStage {
    fn name(&self) -> &'static str {
        "invalid_partition"
    }

    fn should_retry<'a>(&'a mut self, error: &'a QueryError) -> BoxFuture<'a, RetryDecision> {
        Box::pin(async move {
            if !matches!(error, QueryError::NameCacheIsStale(_)) {
                return RetryDecision::Delegate;
            }
            if self.retried {
                return RetryDecision::NoRetry(None);
            }
            self.retried = true;
            RetryDecision::RetryAfter(Duration::ZERO)
        })
    }

    fn on_before_send_request(&mut self, request: &mut FeedRequest) {
        if self.retried {
            request.force_name_cache_refresh = true;
        }
    }
}
