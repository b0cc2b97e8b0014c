//! Collection routing map
//!
//! A complete, immutable snapshot of a collection's physical ranges:
//! sorted by `min_inclusive`, contiguous, non-overlapping, covering
//! `["", "FF")`. Ranges that appear as a parent of another range are
//! retired and excluded from lookups.

use std::collections::{HashMap, HashSet};

use super::partition_key_range::PartitionKeyRange;
use super::range::{Range, MAXIMUM_EXCLUSIVE_EPK, MINIMUM_INCLUSIVE_EPK};

/// Snapshot of the physical layout of one collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRoutingMap {
    collection_unique_id: String,
    ordered_ranges: Vec<PartitionKeyRange>,
    range_index_by_id: HashMap<String, usize>,
    gone_ranges: HashSet<String>,
}

impl CollectionRoutingMap {
    /// Build a complete routing map.
    ///
    /// Returns `None` when the live ranges do not tile the key space
    /// exactly (gap, overlap, duplicate id, or wrong end points).
    pub fn try_create_complete_routing_map(
        ranges: Vec<PartitionKeyRange>,
        collection_unique_id: impl Into<String>,
    ) -> Option<Self> {
        let gone_ranges: HashSet<String> = ranges
            .iter()
            .flat_map(|r| r.parents.iter().cloned())
            .collect();

        let mut ordered_ranges: Vec<PartitionKeyRange> = ranges
            .into_iter()
            .filter(|r| !gone_ranges.contains(&r.id))
            .collect();
        ordered_ranges.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));

        if !Self::is_complete_set_of_ranges(&ordered_ranges) {
            return None;
        }

        let mut range_index_by_id = HashMap::with_capacity(ordered_ranges.len());
        for (index, range) in ordered_ranges.iter().enumerate() {
            if range_index_by_id.insert(range.id.clone(), index).is_some() {
                return None;
            }
        }

        Some(Self {
            collection_unique_id: collection_unique_id.into(),
            ordered_ranges,
            range_index_by_id,
            gone_ranges,
        })
    }

    fn is_complete_set_of_ranges(ordered: &[PartitionKeyRange]) -> bool {
        let (first, last) = match (ordered.first(), ordered.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return false,
        };
        if first.min_inclusive != MINIMUM_INCLUSIVE_EPK || last.max_exclusive != MAXIMUM_EXCLUSIVE_EPK {
            return false;
        }
        ordered.iter().all(|r| r.min_inclusive < r.max_exclusive)
            && ordered
                .windows(2)
                .all(|pair| pair[0].max_exclusive == pair[1].min_inclusive)
    }

    /// Apply ranges produced by splits/merges on top of this snapshot.
    ///
    /// Returns `None` if the result is not a complete map.
    pub fn try_combine(&self, new_ranges: Vec<PartitionKeyRange>) -> Option<Self> {
        let mut all: Vec<PartitionKeyRange> = self.ordered_ranges.clone();
        let incoming_ids: HashSet<&str> = new_ranges.iter().map(|r| r.id.as_str()).collect();
        all.retain(|r| !incoming_ids.contains(r.id.as_str()));
        all.extend(new_ranges);

        let mut combined = Self::try_create_complete_routing_map(all, self.collection_unique_id.clone())?;
        combined.gone_ranges.extend(self.gone_ranges.iter().cloned());
        Some(combined)
    }

    /// Identity of the collection incarnation this map belongs to
    pub fn collection_unique_id(&self) -> &str {
        &self.collection_unique_id
    }

    /// Live ranges in key order
    pub fn ordered_ranges(&self) -> &[PartitionKeyRange] {
        &self.ordered_ranges
    }

    /// Live ranges overlapping `range`, in key order
    pub fn get_overlapping_ranges(&self, range: &Range<String>) -> Vec<PartitionKeyRange> {
        if range.is_empty() {
            return Vec::new();
        }
        let start = self
            .ordered_ranges
            .partition_point(|r| r.max_exclusive <= range.min);

        self.ordered_ranges[start..]
            .iter()
            .take_while(|r| Range::overlaps(&r.to_range(), range))
            .cloned()
            .collect()
    }

    /// Live ranges overlapping any of `ranges`, deduplicated, in key order
    pub fn get_overlapping_ranges_for(&self, ranges: &[Range<String>]) -> Vec<PartitionKeyRange> {
        let mut seen = HashSet::new();
        let mut result: Vec<PartitionKeyRange> = ranges
            .iter()
            .flat_map(|r| self.get_overlapping_ranges(r))
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        result.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));
        result
    }

    /// The live range owning `epk`
    pub fn get_range_by_effective_partition_key(&self, epk: &str) -> Option<&PartitionKeyRange> {
        if epk >= MAXIMUM_EXCLUSIVE_EPK {
            return None;
        }
        let index = self
            .ordered_ranges
            .partition_point(|r| r.max_exclusive.as_str() <= epk);
        self.ordered_ranges.get(index)
    }

    /// Live range by id
    pub fn try_get_range_by_id(&self, id: &str) -> Option<&PartitionKeyRange> {
        self.range_index_by_id
            .get(id)
            .and_then(|&index| self.ordered_ranges.get(index))
    }

    /// Whether `id` was retired by a split or merge
    pub fn is_gone(&self, id: &str) -> bool {
        self.gone_ranges.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_way() -> CollectionRoutingMap {
        CollectionRoutingMap::try_create_complete_routing_map(
            vec![
                PartitionKeyRange::new("2", "80", "C0"),
                PartitionKeyRange::new("0", "", "40"),
                PartitionKeyRange::new("3", "C0", "FF"),
                PartitionKeyRange::new("1", "40", "80"),
            ],
            "coll",
        )
        .unwrap()
    }

    fn ids(ranges: &[PartitionKeyRange]) -> Vec<&str> {
        ranges.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_ranges_are_sorted() {
        let map = four_way();
        assert_eq!(ids(map.ordered_ranges()), vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn test_incomplete_maps_rejected() {
        // gap between 40 and 80
        let gap = CollectionRoutingMap::try_create_complete_routing_map(
            vec![
                PartitionKeyRange::new("0", "", "40"),
                PartitionKeyRange::new("1", "80", "FF"),
            ],
            "coll",
        );
        assert!(gap.is_none());

        let overlap = CollectionRoutingMap::try_create_complete_routing_map(
            vec![
                PartitionKeyRange::new("0", "", "90"),
                PartitionKeyRange::new("1", "80", "FF"),
            ],
            "coll",
        );
        assert!(overlap.is_none());

        assert!(CollectionRoutingMap::try_create_complete_routing_map(vec![], "coll").is_none());
    }

    #[test]
    fn test_parents_are_retired() {
        let map = CollectionRoutingMap::try_create_complete_routing_map(
            vec![
                PartitionKeyRange::new("0", "", "FF"),
                PartitionKeyRange::with_parents("1", "", "80", vec!["0".into()]),
                PartitionKeyRange::with_parents("2", "80", "FF", vec!["0".into()]),
            ],
            "coll",
        )
        .unwrap();
        assert_eq!(ids(map.ordered_ranges()), vec!["1", "2"]);
        assert!(map.is_gone("0"));
        assert!(map.try_get_range_by_id("0").is_none());
    }

    #[test]
    fn test_overlapping_ranges() {
        let map = four_way();
        let hit = map.get_overlapping_ranges(&Range::half_open("50".into(), "90".into()));
        assert_eq!(ids(&hit), vec!["1", "2"]);

        let exact = map.get_overlapping_ranges(&Range::half_open("40".into(), "80".into()));
        assert_eq!(ids(&exact), vec!["1"]);

        let all = map.get_overlapping_ranges(&Range::full());
        assert_eq!(ids(&all), vec!["0", "1", "2", "3"]);

        let point = map.get_overlapping_ranges(&Range::point_of("80"));
        assert_eq!(ids(&point), vec!["2"]);
    }

    #[test]
    fn test_overlapping_for_many_ranges_dedups() {
        let map = four_way();
        let hit = map.get_overlapping_ranges_for(&[
            Range::point_of("C5"),
            Range::half_open("10".into(), "20".into()),
            Range::point_of("15"),
        ]);
        assert_eq!(ids(&hit), vec!["0", "3"]);
    }

    #[test]
    fn test_range_by_epk() {
        let map = four_way();
        assert_eq!(map.get_range_by_effective_partition_key("").unwrap().id, "0");
        assert_eq!(map.get_range_by_effective_partition_key("40").unwrap().id, "1");
        assert_eq!(map.get_range_by_effective_partition_key("BF").unwrap().id, "2");
        assert!(map.get_range_by_effective_partition_key("FF").is_none());
    }

    #[test]
    fn test_combine_split() {
        let map = four_way();
        let split = map
            .try_combine(vec![
                PartitionKeyRange::with_parents("4", "80", "A0", vec!["2".into()]),
                PartitionKeyRange::with_parents("5", "A0", "C0", vec!["2".into()]),
            ])
            .unwrap();
        assert_eq!(ids(split.ordered_ranges()), vec!["0", "1", "4", "5", "3"]);
        assert!(split.is_gone("2"));
    }

    #[test]
    fn test_combine_merge() {
        let map = four_way();
        let merged = map
            .try_combine(vec![PartitionKeyRange::with_parents(
                "6",
                "",
                "80",
                vec!["0".into(), "1".into()],
            )])
            .unwrap();
        assert_eq!(ids(merged.ordered_ranges()), vec!["6", "2", "3"]);
        assert!(merged.is_gone("0") && merged.is_gone("1"));
    }
}
