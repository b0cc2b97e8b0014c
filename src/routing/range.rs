//! Key ranges over the effective partition key space
//!
//! Ranges carry explicit inclusivity on both ends. Physical ranges and
//! composite tokens are always half-open `[min, max)`; point ranges
//! `[k, k]` stand for a single logical partition key.
//!
//! Keys compare byte-wise (`Ord` on `String`), which must match the
//! service's ordering of effective partition keys.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest effective partition key
pub const MINIMUM_INCLUSIVE_EPK: &str = "";

/// Upper bound of the effective partition key space (exclusive)
pub const MAXIMUM_EXCLUSIVE_EPK: &str = "FF";

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A range of keys with explicit bound inclusivity.
///
/// On the wire only non-default inclusivity flags are written, so a
/// half-open range serializes as `{"min": .., "max": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range<K> {
    pub min: K,
    pub max: K,
    #[serde(
        rename = "isMinInclusive",
        default = "default_true",
        skip_serializing_if = "is_true"
    )]
    pub is_min_inclusive: bool,
    #[serde(
        rename = "isMaxInclusive",
        default,
        skip_serializing_if = "is_false"
    )]
    pub is_max_inclusive: bool,
}

impl<K: Ord + Clone> Range<K> {
    /// Create a range with explicit inclusivity
    pub fn new(min: K, max: K, is_min_inclusive: bool, is_max_inclusive: bool) -> Self {
        Self {
            min,
            max,
            is_min_inclusive,
            is_max_inclusive,
        }
    }

    /// Create a half-open range `[min, max)`
    pub fn half_open(min: K, max: K) -> Self {
        Self::new(min, max, true, false)
    }

    /// Create the point range `[key, key]`
    pub fn point(key: K) -> Self {
        Self::new(key.clone(), key, true, true)
    }

    /// Create the empty range `[key, key)`
    pub fn empty(key: K) -> Self {
        Self::new(key.clone(), key, true, false)
    }

    /// `min <= max`; equal bounds yield either a point or an empty range
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// No key satisfies the range
    pub fn is_empty(&self) -> bool {
        self.min == self.max && !(self.is_min_inclusive && self.is_max_inclusive)
    }

    /// Exactly one key satisfies the range
    pub fn is_single_value(&self) -> bool {
        self.min == self.max && self.is_min_inclusive && self.is_max_inclusive
    }

    /// Whether `key` falls inside the range
    pub fn contains(&self, key: &K) -> bool {
        let above_min = match self.min.cmp(key) {
            Ordering::Less => true,
            Ordering::Equal => self.is_min_inclusive,
            Ordering::Greater => false,
        };
        let below_max = match key.cmp(&self.max) {
            Ordering::Less => true,
            Ordering::Equal => self.is_max_inclusive,
            Ordering::Greater => false,
        };
        above_min && below_max
    }

    /// Whether every key of `other` is also in `self`
    pub fn contains_range(&self, other: &Range<K>) -> bool {
        let lower = match self.min.cmp(&other.min) {
            Ordering::Less => true,
            Ordering::Equal => self.is_min_inclusive || !other.is_min_inclusive,
            Ordering::Greater => false,
        };
        let upper = match other.max.cmp(&self.max) {
            Ordering::Less => true,
            Ordering::Equal => self.is_max_inclusive || !other.is_max_inclusive,
            Ordering::Greater => false,
        };
        lower && upper
    }

    /// Whether the two ranges share at least one key
    pub fn overlaps(a: &Range<K>, b: &Range<K>) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        Self::starts_before_end_of(a, b) && Self::starts_before_end_of(b, a)
    }

    fn starts_before_end_of(a: &Range<K>, b: &Range<K>) -> bool {
        match a.min.cmp(&b.max) {
            Ordering::Less => true,
            Ordering::Equal => a.is_min_inclusive && b.is_max_inclusive,
            Ordering::Greater => false,
        }
    }

    /// Intersection of two ranges, `None` when they do not overlap
    pub fn intersect(&self, other: &Range<K>) -> Option<Range<K>> {
        if !Self::overlaps(self, other) {
            return None;
        }
        let (min, is_min_inclusive) = match Self::cmp_by_min(self, other) {
            Ordering::Less => (other.min.clone(), other.is_min_inclusive),
            _ => (self.min.clone(), self.is_min_inclusive),
        };
        let (max, is_max_inclusive) = match Self::cmp_by_max(self, other) {
            Ordering::Greater => (other.max.clone(), other.is_max_inclusive),
            _ => (self.max.clone(), self.is_max_inclusive),
        };
        Some(Range::new(min, max, is_min_inclusive, is_max_inclusive))
    }

    /// Order by lower bound; an inclusive min sorts before an exclusive one
    pub fn cmp_by_min(a: &Range<K>, b: &Range<K>) -> Ordering {
        a.min
            .cmp(&b.min)
            .then_with(|| b.is_min_inclusive.cmp(&a.is_min_inclusive))
    }

    /// Order by upper bound; an exclusive max sorts before an inclusive one
    pub fn cmp_by_max(a: &Range<K>, b: &Range<K>) -> Ordering {
        a.max
            .cmp(&b.max)
            .then_with(|| a.is_max_inclusive.cmp(&b.is_max_inclusive))
    }
}

impl Range<String> {
    /// The whole effective partition key space `["", "FF")`
    pub fn full() -> Self {
        Range::half_open(
            MINIMUM_INCLUSIVE_EPK.to_string(),
            MAXIMUM_EXCLUSIVE_EPK.to_string(),
        )
    }

    /// Point range for an effective partition key
    pub fn point_of(epk: &str) -> Self {
        Range::point(epk.to_string())
    }

    /// Whether this is exactly the full key space
    pub fn is_full(&self) -> bool {
        *self == Range::full()
    }
}

impl<K: Ord + Clone> PartialOrd for Range<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord + Clone> Ord for Range<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        Range::cmp_by_min(self, other).then_with(|| Range::cmp_by_max(self, other))
    }
}

impl<K: fmt::Display> fmt::Display for Range<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{},{}{}",
            if self.is_min_inclusive { '[' } else { '(' },
            self.min,
            self.max,
            if self.is_max_inclusive { ']' } else { ')' }
        )
    }
}
