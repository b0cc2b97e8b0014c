//! Split and merge recovery
//!
//! A `410/1002` means the range id the request was routed to no longer
//! exists. The first occurrence refreshes the routing map past the
//! snapshot the client holds and retries immediately; routing then
//! resolves against the new layout. A second occurrence within the same
//! operation means the layout could not be reconciled.

use std::sync::Arc;
use std::time::Duration;

use super::policy::{RetryDecision, RetryStage};
use crate::errors::{QueryError, QueryResult};
use crate::observability::{log_event, RoutingEvent, RoutingMetrics};
use crate::routing::{BoxFuture, CollectionCache, PartitionKeyRangeCache};

/// Retries `PartitionKeyRangeGone` once after a forced routing map refresh
pub struct GoneRetryStage {
    collection_cache: Arc<dyn CollectionCache>,
    partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
    collection_link: String,
    retried: bool,
    metrics: Option<Arc<RoutingMetrics>>,
}

impl GoneRetryStage {
    pub fn new(
        collection_cache: Arc<dyn CollectionCache>,
        partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
        collection_link: impl Into<String>,
    ) -> Self {
        Self {
            collection_cache,
            partition_key_range_cache,
            collection_link: collection_link.into(),
            retried: false,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn refresh_routing_map(&self) -> QueryResult<String> {
        let collection = self
            .collection_cache
            .resolve_collection(&self.collection_link, false)
            .await?;
        let current = self
            .partition_key_range_cache
            .try_lookup(&collection.resource_id, None)
            .await?;
        if let Some(current) = current {
            self.partition_key_range_cache
                .try_lookup(&collection.resource_id, Some(current.as_ref()))
                .await?;
        }
        Ok(collection.resource_id)
    }
}

impl RetryStage for GoneRetryStage {
    fn name(&self) -> &'static str {
        "partition_key_range_gone"
    }

    fn should_retry<'a>(&'a mut self, error: &'a QueryError) -> BoxFuture<'a, RetryDecision> {
        Box::pin(async move {
            if !matches!(error, QueryError::PartitionKeyRangeGone(_)) {
                return RetryDecision::Delegate;
            }
            if self.retried {
                return RetryDecision::NoRetry(Some(QueryError::not_found(format!(
                    "Routing map of {} could not be reconciled after refresh: {}",
                    self.collection_link, error
                ))));
            }
            self.retried = true;

            match self.refresh_routing_map().await {
                Ok(collection_rid) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.increment_gone_refreshes();
                    }
                    log_event(
                        RoutingEvent::GoneRefresh,
                        &[
                            ("collection_link", &self.collection_link),
                            ("collection_rid", &collection_rid),
                        ],
                    );
                    RetryDecision::RetryAfter(Duration::ZERO)
                }
                Err(e) => RetryDecision::NoRetry(Some(e)),
            }
        })
    }
}

impl std::fmt::Debug for GoneRetryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoneRetryStage")
            .field("collection_link", &self.collection_link)
            .field("retried", &self.retried)
            .finish()
    }
}
