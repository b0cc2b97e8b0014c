//! Feed requests

use serde::{Deserialize, Serialize};

use super::headers::{self, Headers};
use super::plan::SqlQuerySpec;
use crate::routing::Range;

/// Kind of resource a feed enumerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Database,
    Collection,
    Document,
    Conflict,
    PartitionKeyRange,
    Offer,
}

impl ResourceType {
    /// Whether the resource lives inside partitions of a collection
    pub fn is_partitioned(&self) -> bool {
        matches!(self, ResourceType::Document | ResourceType::Conflict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Query,
    ReadFeed,
}

/// Where the transport sends a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// Routed by the partition key header, or an unpartitioned resource
    LogicalPartition,
    /// A physical range of a resolved collection
    PartitionKeyRange { collection_rid: String, range_id: String },
    /// Whole query handed to the gateway
    Gateway,
}

/// One request against a collection feed.
///
/// Built fresh for every attempt so no state from a failed attempt
/// leaks into the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRequest {
    pub operation: OperationType,
    pub resource_type: ResourceType,
    /// Name-based link, e.g. `dbs/db1/colls/orders`
    pub collection_link: String,
    pub query: Option<SqlQuerySpec>,
    /// Read-feed scoped to one logical partition
    pub effective_partition_key: Option<String>,
    pub headers: Headers,
    pub target: RequestTarget,
    /// Bypass the collection name cache on the next resolution
    pub force_name_cache_refresh: bool,
}

impl FeedRequest {
    /// Create a query request
    pub fn query(collection_link: impl Into<String>, query: SqlQuerySpec) -> Self {
        Self::new(OperationType::Query, collection_link, Some(query))
    }

    /// Create a read-feed request
    pub fn read_feed(collection_link: impl Into<String>) -> Self {
        Self::new(OperationType::ReadFeed, collection_link, None)
    }

    fn new(operation: OperationType, collection_link: impl Into<String>, query: Option<SqlQuerySpec>) -> Self {
        Self {
            operation,
            resource_type: ResourceType::Document,
            collection_link: collection_link.into(),
            query,
            effective_partition_key: None,
            headers: Headers::new(),
            target: RequestTarget::LogicalPartition,
            force_name_cache_refresh: false,
        }
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    /// Scope to one logical partition by its serialized key, e.g. `["a"]`
    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.headers.set(headers::PARTITION_KEY, partition_key.into());
        self
    }

    pub fn with_effective_partition_key(mut self, epk: impl Into<String>) -> Self {
        self.effective_partition_key = Some(epk.into());
        self
    }

    /// Serialized partition key, if the request carries one
    pub fn partition_key(&self) -> Option<&str> {
        self.headers.get_non_empty(headers::PARTITION_KEY)
    }

    /// Backend continuation for the target of this attempt
    pub fn continuation(&self) -> Option<&str> {
        self.headers.get_non_empty(headers::CONTINUATION)
    }

    /// Key range the target should read, when narrower than the whole range
    pub fn epk_scope(&self) -> Option<Range<String>> {
        let start = self.headers.get(headers::START_EPK)?;
        let end = self.headers.get(headers::END_EPK)?;
        Some(Range::half_open(start.to_string(), end.to_string()))
    }

    pub fn set_epk_scope(&mut self, scope: Option<&Range<String>>) {
        match scope {
            Some(range) => {
                self.headers.set(headers::START_EPK, range.min.clone());
                self.headers.set(headers::END_EPK, range.max.clone());
            }
            None => {
                self.headers.remove(headers::START_EPK);
                self.headers.remove(headers::END_EPK);
            }
        }
    }

    /// Route to a physical range
    pub fn route_to(&mut self, collection_rid: impl Into<String>, range_id: impl Into<String>) {
        self.target = RequestTarget::PartitionKeyRange {
            collection_rid: collection_rid.into(),
            range_id: range_id.into(),
        };
    }

    pub fn use_gateway_mode(&self) -> bool {
        self.target == RequestTarget::Gateway
    }
}
