//! Collaborator contracts for routing metadata
//!
//! The collection cache and the partition key range cache are shared by
//! every execution context of a client and must be internally
//! thread-safe. The routing core only issues point lookups and explicit
//! force-refresh calls against them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::QueryResult;

use super::partition_key_range::PartitionKeyRange;
use super::range::Range;
use super::routing_map::CollectionRoutingMap;

/// Boxed future returned by collaborator traits
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Partition key paths of a collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    pub paths: Vec<String>,
}

impl PartitionKeyDefinition {
    /// Definition with a single path such as `/tenantId`
    pub fn single(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
        }
    }

    /// Whether the collection is partitioned at all
    pub fn is_partitioned(&self) -> bool {
        !self.paths.is_empty()
    }
}

/// Resolved identity of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Resource id; changes when a collection is deleted and recreated
    pub resource_id: String,
    /// Name-based link, e.g. `dbs/db1/colls/orders`
    pub link: String,
    pub partition_key: PartitionKeyDefinition,
}

/// Maps a collection and key ranges to the current physical ranges.
///
/// `Ok(None)` means the cache has no usable entry (collection unknown
/// or routing map incomplete); callers refresh and retry resolution.
pub trait RoutingMapProvider: Send + Sync {
    /// Physical ranges overlapping `range`, in key order
    fn try_get_overlapping_ranges<'a>(
        &'a self,
        collection_rid: &'a str,
        range: &'a Range<String>,
        force_refresh: bool,
    ) -> BoxFuture<'a, QueryResult<Option<Vec<PartitionKeyRange>>>>;

    /// Physical range by id
    fn try_get_partition_key_range_by_id<'a>(
        &'a self,
        collection_rid: &'a str,
        range_id: &'a str,
        force_refresh: bool,
    ) -> BoxFuture<'a, QueryResult<Option<PartitionKeyRange>>>;

    /// Physical range owning an effective partition key
    fn try_get_range_by_effective_partition_key<'a>(
        &'a self,
        collection_rid: &'a str,
        epk: &'a str,
    ) -> BoxFuture<'a, QueryResult<Option<PartitionKeyRange>>> {
        Box::pin(async move {
            let point = Range::point_of(epk);
            let ranges = self
                .try_get_overlapping_ranges(collection_rid, &point, false)
                .await?;
            Ok(ranges.and_then(|mut r| if r.len() == 1 { r.pop() } else { None }))
        })
    }
}

/// Routing map cache with explicit refresh
pub trait PartitionKeyRangeCache: RoutingMapProvider {
    /// Current routing map for a collection.
    ///
    /// Passing the map the caller already holds as `previous` forces a
    /// refresh past it, bypassing freshness checks.
    fn try_lookup<'a>(
        &'a self,
        collection_rid: &'a str,
        previous: Option<&'a CollectionRoutingMap>,
    ) -> BoxFuture<'a, QueryResult<Option<Arc<CollectionRoutingMap>>>>;
}

/// Resolves collection links to collection identities
pub trait CollectionCache: Send + Sync {
    /// Resolve a name-based link.
    ///
    /// Fails with `NotFound` when the collection no longer exists.
    fn resolve_collection<'a>(
        &'a self,
        collection_link: &'a str,
        force_refresh: bool,
    ) -> BoxFuture<'a, QueryResult<CollectionMetadata>>;
}
