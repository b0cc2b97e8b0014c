//! In-memory routing caches
//!
//! Both caches keep two views: the live view (what the service would
//! answer right now) and the cached view the client last fetched.
//! Lookups read the cached view; a forced refresh copies live over
//! cached. Splits, merges and collection recreation only change the
//! live view, so staleness behaves the way it does against a real
//! service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::errors::{QueryError, QueryResult};

use super::partition_key_range::PartitionKeyRange;
use super::provider::{
    BoxFuture, CollectionCache, CollectionMetadata, PartitionKeyRangeCache, RoutingMapProvider,
};
use super::range::Range;
use super::routing_map::CollectionRoutingMap;

fn poisoned() -> QueryError {
    QueryError::Internal("Lock poisoned".to_string())
}

/// Routing map cache over an in-memory live layout
#[derive(Debug, Default)]
pub struct InMemoryPartitionKeyRangeCache {
    live: RwLock<HashMap<String, CollectionRoutingMap>>,
    cached: RwLock<HashMap<String, Arc<CollectionRoutingMap>>>,
    refreshes: AtomicU64,
}

impl InMemoryPartitionKeyRangeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection layout; both views see it immediately
    pub fn insert_collection(&self, collection_rid: &str, ranges: Vec<PartitionKeyRange>) -> QueryResult<()> {
        let map = CollectionRoutingMap::try_create_complete_routing_map(ranges, collection_rid)
            .ok_or_else(|| QueryError::Internal(format!("Incomplete routing map for {}", collection_rid)))?;
        self.live
            .write()
            .map_err(|_| poisoned())?
            .insert(collection_rid.to_string(), map.clone());
        self.cached
            .write()
            .map_err(|_| poisoned())?
            .insert(collection_rid.to_string(), Arc::new(map));
        Ok(())
    }

    /// Apply ranges produced by a split or merge to the live view only
    pub fn apply_live_ranges(&self, collection_rid: &str, new_ranges: Vec<PartitionKeyRange>) -> QueryResult<()> {
        let mut live = self.live.write().map_err(|_| poisoned())?;
        let current = live
            .get(collection_rid)
            .ok_or_else(|| QueryError::not_found(format!("Collection {}", collection_rid)))?;
        let combined = current
            .try_combine(new_ranges)
            .ok_or_else(|| QueryError::Internal(format!("Incomplete routing map for {}", collection_rid)))?;
        live.insert(collection_rid.to_string(), combined);
        Ok(())
    }

    /// Split a live range at `split_epk` into two children
    pub fn split_range(
        &self,
        collection_rid: &str,
        range_id: &str,
        split_epk: &str,
        child_ids: (&str, &str),
    ) -> QueryResult<()> {
        let parent = self
            .live_map(collection_rid)?
            .and_then(|m| m.try_get_range_by_id(range_id).cloned())
            .ok_or_else(|| QueryError::not_found(format!("Range {} of {}", range_id, collection_rid)))?;
        if !(parent.min_inclusive.as_str() < split_epk && split_epk < parent.max_exclusive.as_str()) {
            return Err(QueryError::bad_request(format!(
                "Split point {} outside range {}",
                split_epk, range_id
            )));
        }
        self.apply_live_ranges(
            collection_rid,
            vec![
                PartitionKeyRange::with_parents(
                    child_ids.0,
                    parent.min_inclusive.clone(),
                    split_epk,
                    vec![parent.id.clone()],
                ),
                PartitionKeyRange::with_parents(
                    child_ids.1,
                    split_epk,
                    parent.max_exclusive.clone(),
                    vec![parent.id.clone()],
                ),
            ],
        )
    }

    /// Merge adjacent live ranges into one
    pub fn merge_ranges(&self, collection_rid: &str, range_ids: &[&str], merged_id: &str) -> QueryResult<()> {
        let map = self
            .live_map(collection_rid)?
            .ok_or_else(|| QueryError::not_found(format!("Collection {}", collection_rid)))?;
        let mut parents: Vec<PartitionKeyRange> = range_ids
            .iter()
            .map(|id| {
                map.try_get_range_by_id(id)
                    .cloned()
                    .ok_or_else(|| QueryError::not_found(format!("Range {} of {}", id, collection_rid)))
            })
            .collect::<QueryResult<_>>()?;
        parents.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));

        let (first, last) = match (parents.first(), parents.last()) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            _ => return Err(QueryError::bad_request("Nothing to merge")),
        };
        if !parents.windows(2).all(|p| p[0].max_exclusive == p[1].min_inclusive) {
            return Err(QueryError::bad_request("Merged ranges must be adjacent"));
        }
        self.apply_live_ranges(
            collection_rid,
            vec![PartitionKeyRange::with_parents(
                merged_id,
                first.min_inclusive,
                last.max_exclusive,
                parents.into_iter().map(|p| p.id).collect(),
            )],
        )
    }

    /// Drop a collection from the live view (deleted)
    pub fn remove_live_collection(&self, collection_rid: &str) -> QueryResult<()> {
        self.live.write().map_err(|_| poisoned())?.remove(collection_rid);
        Ok(())
    }

    /// Copy of the live layout
    pub fn live_map(&self, collection_rid: &str) -> QueryResult<Option<CollectionRoutingMap>> {
        Ok(self.live.read().map_err(|_| poisoned())?.get(collection_rid).cloned())
    }

    /// Number of forced refreshes served
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    fn snapshot(&self, collection_rid: &str, force_refresh: bool) -> QueryResult<Option<Arc<CollectionRoutingMap>>> {
        if !force_refresh {
            let cached = self.cached.read().map_err(|_| poisoned())?;
            if let Some(map) = cached.get(collection_rid) {
                return Ok(Some(Arc::clone(map)));
            }
        } else {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        }

        let live = self.live_map(collection_rid)?;
        let mut cached = self.cached.write().map_err(|_| poisoned())?;
        match live {
            Some(map) => {
                let map = Arc::new(map);
                cached.insert(collection_rid.to_string(), Arc::clone(&map));
                Ok(Some(map))
            }
            None => {
                cached.remove(collection_rid);
                Ok(None)
            }
        }
    }
}

impl RoutingMapProvider for InMemoryPartitionKeyRangeCache {
    fn try_get_overlapping_ranges<'a>(
        &'a self,
        collection_rid: &'a str,
        range: &'a Range<String>,
        force_refresh: bool,
    ) -> BoxFuture<'a, QueryResult<Option<Vec<PartitionKeyRange>>>> {
        Box::pin(async move {
            let map = self.snapshot(collection_rid, force_refresh)?;
            Ok(map.map(|m| m.get_overlapping_ranges(range)))
        })
    }

    fn try_get_partition_key_range_by_id<'a>(
        &'a self,
        collection_rid: &'a str,
        range_id: &'a str,
        force_refresh: bool,
    ) -> BoxFuture<'a, QueryResult<Option<PartitionKeyRange>>> {
        Box::pin(async move {
            let map = self.snapshot(collection_rid, force_refresh)?;
            Ok(map.and_then(|m| m.try_get_range_by_id(range_id).cloned()))
        })
    }

    fn try_get_range_by_effective_partition_key<'a>(
        &'a self,
        collection_rid: &'a str,
        epk: &'a str,
    ) -> BoxFuture<'a, QueryResult<Option<PartitionKeyRange>>> {
        Box::pin(async move {
            let map = self.snapshot(collection_rid, false)?;
            Ok(map.and_then(|m| m.get_range_by_effective_partition_key(epk).cloned()))
        })
    }
}

impl PartitionKeyRangeCache for InMemoryPartitionKeyRangeCache {
    fn try_lookup<'a>(
        &'a self,
        collection_rid: &'a str,
        previous: Option<&'a CollectionRoutingMap>,
    ) -> BoxFuture<'a, QueryResult<Option<Arc<CollectionRoutingMap>>>> {
        Box::pin(async move { self.snapshot(collection_rid, previous.is_some()) })
    }
}

/// Name cache over an in-memory set of collections
#[derive(Debug, Default)]
pub struct InMemoryCollectionCache {
    live: RwLock<HashMap<String, CollectionMetadata>>,
    cached: RwLock<HashMap<String, CollectionMetadata>>,
    refreshes: AtomicU64,
}

impl InMemoryCollectionCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection; both views see it immediately
    pub fn insert(&self, metadata: CollectionMetadata) -> QueryResult<()> {
        self.live
            .write()
            .map_err(|_| poisoned())?
            .insert(metadata.link.clone(), metadata.clone());
        self.cached
            .write()
            .map_err(|_| poisoned())?
            .insert(metadata.link.clone(), metadata);
        Ok(())
    }

    /// Replace the live identity behind a link (delete + recreate)
    pub fn recreate_live(&self, metadata: CollectionMetadata) -> QueryResult<()> {
        self.live
            .write()
            .map_err(|_| poisoned())?
            .insert(metadata.link.clone(), metadata);
        Ok(())
    }

    /// Delete a collection from the live view
    pub fn remove_live(&self, link: &str) -> QueryResult<()> {
        self.live.write().map_err(|_| poisoned())?.remove(link);
        Ok(())
    }

    /// Number of forced refreshes served
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl CollectionCache for InMemoryCollectionCache {
    fn resolve_collection<'a>(
        &'a self,
        collection_link: &'a str,
        force_refresh: bool,
    ) -> BoxFuture<'a, QueryResult<CollectionMetadata>> {
        Box::pin(async move {
            if !force_refresh {
                let cached = self.cached.read().map_err(|_| poisoned())?;
                if let Some(metadata) = cached.get(collection_link) {
                    return Ok(metadata.clone());
                }
            } else {
                self.refreshes.fetch_add(1, Ordering::Relaxed);
            }

            let live = self
                .live
                .read()
                .map_err(|_| poisoned())?
                .get(collection_link)
                .cloned();
            let mut cached = self.cached.write().map_err(|_| poisoned())?;
            match live {
                Some(metadata) => {
                    cached.insert(collection_link.to_string(), metadata.clone());
                    Ok(metadata)
                }
                None => {
                    cached.remove(collection_link);
                    Err(QueryError::not_found(format!("Collection {}", collection_link)))
                }
            }
        })
    }
}
