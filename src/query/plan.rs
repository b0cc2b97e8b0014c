//! Query plan collaborator
//!
//! SQL parsing happens elsewhere. The routing core only needs the plan's
//! logical EPK ranges and a few flags describing client-side work.

use serde::{Deserialize, Serialize};

use crate::errors::QueryResult;
use crate::routing::Range;

pub use crate::routing::PartitionKeyDefinition;

/// Newest plan version this crate understands
pub const CURRENT_PLAN_VERSION: u32 = 2;

/// A parameterized SQL query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlQuerySpec {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SqlParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: serde_json::Value,
}

impl SqlQuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a `@name` parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.push(SqlParameter {
            name: name.into(),
            value,
        });
        self
    }
}

/// Client-side work a query needs beyond a plain scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    #[serde(default)]
    pub has_top: bool,
    #[serde(default)]
    pub has_order_by: bool,
    #[serde(default)]
    pub has_aggregates: bool,
    #[serde(default)]
    pub has_distinct: bool,
    #[serde(default)]
    pub has_offset: bool,
    #[serde(default)]
    pub has_limit: bool,
    #[serde(default)]
    pub has_group_by: bool,
}

impl QueryInfo {
    /// Whether a fan-out of this query needs client-side processing
    pub fn needs_client_side_processing(&self) -> bool {
        self.has_top
            || self.has_order_by
            || self.has_aggregates
            || self.has_distinct
            || self.has_offset
            || self.has_limit
            || self.has_group_by
    }
}

/// Plan output: version, flags and the logical ranges to visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionedQueryExecutionInfo {
    #[serde(rename = "partitionedQueryExecutionInfoVersion")]
    pub version: u32,
    pub query_info: QueryInfo,
    pub query_ranges: Vec<Range<String>>,
}

impl PartitionedQueryExecutionInfo {
    /// Whether the plan targets exactly one logical partition
    pub fn is_single_partition(&self) -> bool {
        matches!(self.query_ranges.as_slice(), [only] if only.is_single_value())
    }
}

/// Produces query plans
pub trait QueryPlanProvider: Send + Sync {
    fn try_get_partitioned_query_execution_info(
        &self,
        query: &SqlQuerySpec,
        partition_key: &PartitionKeyDefinition,
        is_continuation_expected: bool,
    ) -> QueryResult<PartitionedQueryExecutionInfo>;
}

/// Plan provider that always answers with the same plan
#[derive(Debug, Clone)]
pub struct FixedQueryPlanProvider {
    plan: PartitionedQueryExecutionInfo,
}

impl FixedQueryPlanProvider {
    pub fn new(plan: PartitionedQueryExecutionInfo) -> Self {
        Self { plan }
    }

    /// Plain scan over the full key space
    pub fn full_scan() -> Self {
        Self::new(PartitionedQueryExecutionInfo {
            version: CURRENT_PLAN_VERSION,
            query_info: QueryInfo::default(),
            query_ranges: vec![Range::full()],
        })
    }
}

impl QueryPlanProvider for FixedQueryPlanProvider {
    fn try_get_partitioned_query_execution_info(
        &self,
        _query: &SqlQuerySpec,
        _partition_key: &PartitionKeyDefinition,
        _is_continuation_expected: bool,
    ) -> QueryResult<PartitionedQueryExecutionInfo> {
        Ok(self.plan.clone())
    }
}
