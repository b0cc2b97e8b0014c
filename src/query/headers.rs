//! Request and response header names and the header map

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CONTINUATION: &str = "x-ms-continuation";
pub const PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
pub const PARTITION_KEY_RANGE_ID: &str = "x-ms-documentdb-partitionkeyrangeid";
pub const IS_CONTINUATION_EXPECTED: &str = "x-ms-documentdb-query-iscontinuationexpected";
pub const ENABLE_CROSS_PARTITION_QUERY: &str = "x-ms-documentdb-query-enablecrosspartition";
pub const SESSION_TOKEN: &str = "x-ms-session-token";
pub const MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
pub const QUERY_METRICS: &str = "x-ms-documentdb-query-metrics";
pub const REQUEST_CHARGE: &str = "x-ms-request-charge";
pub const ACTIVITY_ID: &str = "x-ms-activity-id";
pub const VERSION: &str = "x-ms-version";
pub const START_EPK: &str = "x-ms-start-epk";
pub const END_EPK: &str = "x-ms-end-epk";

/// Case-preserving header map with deterministic iteration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header value, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Header value, treating an empty value as absent
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_string(), value.into());
    }

    /// Set `name` when `value` is `Some`, remove it otherwise
    pub fn set_or_remove(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(v) => self.set(name, v),
            None => {
                self.remove(name);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
