//! Logical ranges a request must cover

use crate::errors::{QueryError, QueryResult};
use crate::query::plan::{PartitionKeyDefinition, QueryPlanProvider, SqlQuerySpec, CURRENT_PLAN_VERSION};

use super::range::Range;

/// Inputs for computing provided ranges
#[derive(Debug, Clone, Copy)]
pub struct ProvidedRangesRequest<'a> {
    /// `None` for read-feed requests
    pub query: Option<&'a SqlQuerySpec>,
    /// Effective partition key of a read-feed scoped to one logical partition
    pub effective_partition_key: Option<&'a str>,
    pub enable_cross_partition_query: bool,
    pub is_continuation_expected: bool,
    pub partition_key: &'a PartitionKeyDefinition,
}

/// Compute the logical EPK ranges for a request.
///
/// Read-feeds cover a point range when scoped to a partition key and the
/// full key space otherwise. Queries take their ranges from the plan,
/// after checking that a sequential single-range walk can serve them.
pub fn get_provided_partition_key_ranges<P>(
    request: &ProvidedRangesRequest<'_>,
    plan_provider: &P,
) -> QueryResult<Vec<Range<String>>>
where
    P: QueryPlanProvider + ?Sized,
{
    let query = match request.query {
        Some(query) => query,
        None => {
            return Ok(match request.effective_partition_key {
                Some(epk) => vec![Range::point_of(epk)],
                None => vec![Range::full()],
            });
        }
    };

    let plan = plan_provider.try_get_partitioned_query_execution_info(
        query,
        request.partition_key,
        request.is_continuation_expected,
    )?;
    let info = &plan.query_info;

    let fans_out = request.partition_key.is_partitioned() && !plan.is_single_partition();
    if fans_out {
        if !request.enable_cross_partition_query {
            return Err(QueryError::bad_request(
                "Cross partition query is required but disabled. Enable cross partition query or supply a partition key.",
            ));
        }
        if info.needs_client_side_processing() {
            if plan.version > CURRENT_PLAN_VERSION {
                return Err(QueryError::bad_request(format!(
                    "Unsupported query plan version {}",
                    plan.version
                )));
            }
            return Err(QueryError::CrossPartitionQueryNotServable(
                "Cross partition query with TOP, ORDER BY, aggregates, DISTINCT, OFFSET, LIMIT or GROUP BY cannot be served sequentially".to_string(),
            ));
        }
    } else if (info.has_aggregates && !request.is_continuation_expected) || info.has_distinct || info.has_group_by {
        return Err(QueryError::CrossPartitionQueryNotServable(
            "Query requires client-side processing".to_string(),
        ));
    }

    Ok(plan.query_ranges)
}
