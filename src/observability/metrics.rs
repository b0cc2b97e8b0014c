//! Routing counters
//!
//! - Counters only, monotonic
//! - Thread-safe, lock-free
//! - Shared by every execution context of one client

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the routing protocol
#[derive(Debug, Default)]
pub struct RoutingMetrics {
    /// Pages returned to callers
    pages_fetched: AtomicU64,
    /// Items returned to callers
    items_returned: AtomicU64,
    /// Attempts retried by the policy chain
    retries: AtomicU64,
    /// Forced routing map refreshes after a gone error
    gone_refreshes: AtomicU64,
    /// Forced name cache refreshes
    name_cache_refreshes: AtomicU64,
    /// Continuation ranges found split
    splits_observed: AtomicU64,
    /// Continuation ranges found merged
    merges_observed: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub pages_fetched: u64,
    pub items_returned: u64,
    pub retries: u64,
    pub gone_refreshes: u64,
    pub name_cache_refreshes: u64,
    pub splits_observed: u64,
    pub merges_observed: u64,
}

impl RoutingMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one page with `items` entries
    pub fn record_page(&self, items: u64) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.items_returned.fetch_add(items, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_gone_refreshes(&self) {
        self.gone_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_name_cache_refreshes(&self) {
        self.name_cache_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_splits(&self) {
        self.splits_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_merges(&self) {
        self.merges_observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            items_returned: self.items_returned.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            gone_refreshes: self.gone_refreshes.load(Ordering::Relaxed),
            name_cache_refreshes: self.name_cache_refreshes.load(Ordering::Relaxed),
            splits_observed: self.splits_observed.load(Ordering::Relaxed),
            merges_observed: self.merges_observed.load(Ordering::Relaxed),
        }
    }

    /// Snapshot rendered as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_value(self.snapshot())
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}
