//! Retry policy chain
//!
//! A chain is an ordered list of stages. Each stage either decides
//! (retry after a delay, or stop) or delegates to the next one. The
//! standard chain for a feed page is:
//!
//! 1. partition key range gone (partitioned resources only)
//! 2. invalid partition / stale name cache
//! 3. session reset
//! 4. transient backoff
//!
//! Every stage is single-use per page: build a new chain for each page.

mod gone;
mod invalid_partition;
mod policy;
mod session;
mod transient;

use std::sync::Arc;

pub use gone::GoneRetryStage;
pub use invalid_partition::InvalidPartitionRetryStage;
pub use policy::{RetryDecision, RetryPolicyChain, RetryStage};
pub use session::SessionResetRetryStage;
pub use transient::TransientRetryStage;

use crate::observability::RoutingMetrics;
use crate::query::config::ExecutionConfig;
use crate::routing::{CollectionCache, PartitionKeyRangeCache};

/// Build the standard chain for one page of a feed over `collection_link`
pub fn standard_chain(
    config: &ExecutionConfig,
    partitioned: bool,
    collection_cache: &Arc<dyn CollectionCache>,
    partition_key_range_cache: &Arc<dyn PartitionKeyRangeCache>,
    collection_link: &str,
    metrics: &Arc<RoutingMetrics>,
) -> RetryPolicyChain {
    let mut chain = RetryPolicyChain::new();
    if partitioned {
        chain = chain.with_stage(
            GoneRetryStage::new(
                Arc::clone(collection_cache),
                Arc::clone(partition_key_range_cache),
                collection_link,
            )
            .with_metrics(Arc::clone(metrics)),
        );
    }
    chain
        .with_stage(InvalidPartitionRetryStage::new())
        .with_stage(SessionResetRetryStage::new())
        .with_stage(TransientRetryStage::new(
            config.max_transient_retries,
            config.initial_backoff(),
            config.max_backoff(),
        ))
}
