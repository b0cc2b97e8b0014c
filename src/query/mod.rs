//! Feed execution
//!
//! Requests, responses and the sequential execution context that walks
//! a collection one physical range at a time.

pub mod config;
pub mod context;
pub mod headers;
pub mod metrics;
pub mod plan;
pub mod request;
pub mod response;
pub mod transport;

pub use config::ExecutionConfig;
pub use context::{
    create_execution_context, ContextState, DefaultExecutionContext, DocumentQueryExecutionContext, QueryClient,
    GATEWAY_PARTITION_ID,
};
pub use headers::Headers;
pub use metrics::{ClientSideMetrics, FetchExecutionRange, SchedulingTimeSpan};
pub use plan::{
    FixedQueryPlanProvider, PartitionedQueryExecutionInfo, QueryInfo, QueryPlanProvider, SqlQuerySpec,
    CURRENT_PLAN_VERSION,
};
pub use request::{FeedRequest, OperationType, RequestTarget, ResourceType};
pub use response::FeedResponse;
pub use transport::Transport;
