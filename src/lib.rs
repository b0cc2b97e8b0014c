//! crossfeed - Cross-partition feed routing for partitioned document collections
//!
//! Walks a query or read-feed across the physical partitions of a
//! collection one range at a time, survives splits and merges, and
//! encodes progress as a resumable composite continuation.

pub mod continuation;
pub mod errors;
pub mod observability;
pub mod query;
pub mod retry;
pub mod routing;

pub use continuation::CompositeContinuationToken;
pub use errors::{QueryError, QueryResult};
pub use query::{
    create_execution_context, DocumentQueryExecutionContext, ExecutionConfig, FeedRequest, FeedResponse, QueryClient,
};
