//! Partition routing
//!
//! Maps logical key ranges onto the physical partition layout of a
//! collection and drives the one-range-at-a-time walk across it.
//!
//! # Invariants
//!
//! - Effective partition keys compare byte-wise
//! - A complete routing map covers `["", "FF")` with no gaps or overlaps
//! - Routing metadata may be stale; staleness is repaired by forced
//!   refresh, never prevented

mod cache;
mod helper;
mod partition_key_range;
mod provided_ranges;
mod provider;
mod range;
mod routing_map;

pub use cache::{InMemoryCollectionCache, InMemoryPartitionKeyRangeCache};
pub use helper::{ExtractedContinuation, PartitionRoutingHelper, ResolvedRangeInfo};
pub use partition_key_range::PartitionKeyRange;
pub use provided_ranges::{get_provided_partition_key_ranges, ProvidedRangesRequest};
pub use provider::{
    BoxFuture, CollectionCache, CollectionMetadata, PartitionKeyDefinition, PartitionKeyRangeCache,
    RoutingMapProvider,
};
pub use range::{Range, MAXIMUM_EXCLUSIVE_EPK, MINIMUM_INCLUSIVE_EPK};
pub use routing_map::CollectionRoutingMap;
