//! Retry stages and the chain that drives them

use std::time::Duration;

use crate::errors::QueryError;
use crate::observability::{log_event, RoutingEvent};
use crate::query::request::FeedRequest;
use crate::routing::BoxFuture;

/// Outcome of asking a stage about an error
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry after the delay
    RetryAfter(Duration),
    /// Stop; surface the replacement error if given, else the original
    NoRetry(Option<QueryError>),
    /// Not this stage's error
    Delegate,
}

/// One stage of a retry chain.
///
/// Stages are stateful and belong to a single logical operation; build
/// a fresh chain for every page.
pub trait RetryStage: Send {
    /// Stage name for logs
    fn name(&self) -> &'static str;

    /// Decide on `error`
    fn should_retry<'a>(&'a mut self, error: &'a QueryError) -> BoxFuture<'a, RetryDecision>;

    /// Adjust the next attempt's request
    fn on_before_send_request(&mut self, _request: &mut FeedRequest) {}
}

/// Ordered stages; the first stage that does not delegate decides
#[derive(Default)]
pub struct RetryPolicyChain {
    stages: Vec<Box<dyn RetryStage>>,
    retries: u32,
}

impl RetryPolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn with_stage(mut self, stage: impl RetryStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Stage names in decision order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Retries granted so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Ask each stage in order. Never returns `Delegate`.
    pub async fn should_retry(&mut self, error: &QueryError) -> RetryDecision {
        for stage in self.stages.iter_mut() {
            match stage.should_retry(error).await {
                RetryDecision::Delegate => continue,
                RetryDecision::RetryAfter(delay) => {
                    self.retries += 1;
                    log_event(
                        RoutingEvent::RetryScheduled,
                        &[
                            ("code", error.code()),
                            ("delay_ms", &delay.as_millis().to_string()),
                            ("stage", stage.name()),
                        ],
                    );
                    return RetryDecision::RetryAfter(delay);
                }
                RetryDecision::NoRetry(replacement) => {
                    log_event(
                        RoutingEvent::RetryExhausted,
                        &[("code", error.code()), ("stage", stage.name())],
                    );
                    return RetryDecision::NoRetry(replacement);
                }
            }
        }
        RetryDecision::NoRetry(None)
    }

    /// Let every stage adjust the next attempt
    pub fn on_before_send_request(&mut self, request: &mut FeedRequest) {
        for stage in self.stages.iter_mut() {
            stage.on_before_send_request(request);
        }
    }
}

impl std::fmt::Debug for RetryPolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicyChain")
            .field("stages", &self.stage_names())
            .field("retries", &self.retries)
            .finish()
    }
}
