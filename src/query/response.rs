//! Feed responses

use std::collections::BTreeMap;

use serde_json::Value;

use super::headers::{self, Headers};
use super::metrics::ClientSideMetrics;

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct FeedResponse {
    pub items: Vec<Value>,
    pub headers: Headers,
    /// Diagnostics keyed by partition identifier
    pub query_metrics: BTreeMap<String, ClientSideMetrics>,
}

impl FeedResponse {
    pub fn new(items: Vec<Value>, headers: Headers) -> Self {
        Self {
            items,
            headers,
            query_metrics: BTreeMap::new(),
        }
    }

    /// Continuation to resume after this page; `None` when the feed is drained
    pub fn continuation(&self) -> Option<&str> {
        self.headers.get_non_empty(headers::CONTINUATION)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Request units charged; 0 when absent or unparsable
    pub fn request_charge(&self) -> f64 {
        self.headers
            .get(headers::REQUEST_CHARGE)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0)
    }

    pub fn activity_id(&self) -> Option<&str> {
        self.headers.get_non_empty(headers::ACTIVITY_ID)
    }

    pub fn backend_query_metrics(&self) -> Option<&str> {
        self.headers.get_non_empty(headers::QUERY_METRICS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let mut h = Headers::new();
        h.set(headers::REQUEST_CHARGE, "2.5");
        h.set(headers::CONTINUATION, "");
        let page = FeedResponse::new(vec![json!({"id": "1"})], h);
        assert_eq!(page.request_charge(), 2.5);
        assert_eq!(page.continuation(), None);
        assert_eq!(page.item_count(), 1);
        assert_eq!(page.activity_id(), None);
    }
}
