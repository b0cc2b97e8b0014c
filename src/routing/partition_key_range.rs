//! Physical partition key ranges
//!
//! A physical range is owned by the backend and observed by the client
//! only through routing map snapshots. After a split or merge the new
//! ranges list the retired ranges in `parents`.

use serde::{Deserialize, Serialize};

use super::range::Range;

/// One physical partition of a collection: `[min_inclusive, max_exclusive)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKeyRange {
    pub id: String,
    #[serde(rename = "minInclusive")]
    pub min_inclusive: String,
    #[serde(rename = "maxExclusive")]
    pub max_exclusive: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    /// Create a range with no parents
    pub fn new(
        id: impl Into<String>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
            parents: Vec::new(),
        }
    }

    /// Create a range produced by a split or merge of `parents`
    pub fn with_parents(
        id: impl Into<String>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
        parents: Vec<String>,
    ) -> Self {
        Self {
            parents,
            ..Self::new(id, min_inclusive, max_exclusive)
        }
    }

    /// Key range covered by this partition
    pub fn to_range(&self) -> Range<String> {
        Range::half_open(self.min_inclusive.clone(), self.max_exclusive.clone())
    }

    /// Whether `epk` is owned by this partition
    pub fn contains_epk(&self, epk: &str) -> bool {
        self.min_inclusive.as_str() <= epk && epk < self.max_exclusive.as_str()
    }
}
