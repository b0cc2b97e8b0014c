//! Read-session-not-available recovery

use std::time::Duration;

use super::policy::{RetryDecision, RetryStage};
use crate::errors::QueryError;
use crate::query::headers;
use crate::query::request::FeedRequest;
use crate::routing::BoxFuture;

/// Retries `404/1002` once without the session token
#[derive(Debug, Clone, Default)]
pub struct SessionResetRetryStage {
    retried: bool,
    drop_session_token: bool,
}

impl SessionResetRetryStage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RetryStage for SessionResetRetryStage {
    fn name(&self) -> &'static str {
        "session_reset"
    }

    fn should_retry<'a>(&'a mut self, error: &'a QueryError) -> BoxFuture<'a, RetryDecision> {
        Box::pin(async move {
            if !matches!(error, QueryError::ReadSessionNotAvailable(_)) {
                return RetryDecision::Delegate;
            }
            if self.retried {
                return RetryDecision::NoRetry(None);
            }
            self.retried = true;
            self.drop_session_token = true;
            RetryDecision::RetryAfter(Duration::ZERO)
        })
    }

    fn on_before_send_request(&mut self, request: &mut FeedRequest) {
        if self.drop_session_token {
            request.headers.remove(headers::SESSION_TOKEN);
        }
    }
}
