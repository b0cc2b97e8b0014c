//! Simulated backend for integration tests
//!
//! Documents sit at fixed effective partition keys. Physical ranges come
//! from the live view of an `InMemoryPartitionKeyRangeCache`, so tests
//! split and merge ranges while a feed is in flight. Backend
//! continuations are the EPK of the last document returned; a request
//! to a retired range id fails with `410/1002`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crossfeed::errors::{status, sub_status, QueryError, QueryResult};
use crossfeed::query::headers;
use crossfeed::query::{
    DocumentQueryExecutionContext, ExecutionConfig, FeedRequest, FeedResponse, FixedQueryPlanProvider,
    QueryClient, QueryPlanProvider, RequestTarget, Transport,
};
use crossfeed::routing::{
    BoxFuture, CollectionMetadata, InMemoryCollectionCache, InMemoryPartitionKeyRangeCache, PartitionKeyDefinition,
    PartitionKeyRange, Range,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const LINK: &str = "dbs/db/colls/orders";
pub const RID: &str = "rid-orders";

/// Two-digit upper-case hex EPKs, `step` apart
pub fn epks(step: usize) -> Vec<String> {
    (0..255).step_by(step).map(|i| format!("{:02X}", i)).collect()
}

pub fn r(min: &str, max: &str) -> Range<String> {
    Range::half_open(min.to_string(), max.to_string())
}

pub struct SimulatedBackend {
    docs: Vec<String>,
    page_size: usize,
    ranges: Arc<InMemoryPartitionKeyRangeCache>,
    faults: Mutex<VecDeque<QueryError>>,
    requests: Mutex<Vec<FeedRequest>>,
}

impl SimulatedBackend {
    fn page(&self, scope: &Range<String>, after: Option<&str>) -> (Vec<Value>, Option<String>) {
        let matching: Vec<&String> = self
            .docs
            .iter()
            .filter(|epk| scope.contains(epk))
            .filter(|epk| after.map_or(true, |a| epk.as_str() > a))
            .collect();
        let page: Vec<Value> = matching
            .iter()
            .take(self.page_size)
            .map(|epk| json!({"id": epk, "epk": epk}))
            .collect();
        let continuation = if matching.len() > self.page_size {
            matching.get(self.page_size - 1).map(|epk| epk.to_string())
        } else {
            None
        };
        (page, continuation)
    }

    fn serve(&self, request: &FeedRequest) -> QueryResult<FeedResponse> {
        if let Some(fault) = self.faults.lock().map_err(|_| QueryError::Internal("poisoned".into()))?.pop_front() {
            return Err(fault);
        }

        let after = request.continuation();
        let (items, continuation) = match &request.target {
            RequestTarget::PartitionKeyRange { collection_rid, range_id } => {
                let live = self
                    .ranges
                    .live_map(collection_rid)?
                    .ok_or_else(|| QueryError::from_status(status::NOT_FOUND, sub_status::UNKNOWN, "collection"))?;
                let range = live.try_get_range_by_id(range_id).ok_or_else(|| {
                    QueryError::from_status(status::GONE, sub_status::PARTITION_KEY_RANGE_GONE, range_id.clone())
                })?;
                let scope = match request.epk_scope() {
                    Some(scope) => scope
                        .intersect(&range.to_range())
                        .ok_or_else(|| QueryError::bad_request("scope outside range"))?,
                    None => range.to_range(),
                };
                self.page(&scope, after)
            }
            RequestTarget::LogicalPartition => match request.partition_key() {
                Some(pk) => self.page(&Range::point_of(pk), after),
                None => self.page(&Range::full(), after),
            },
            RequestTarget::Gateway => self.page(&Range::full(), after),
        };

        let mut h = headers::Headers::new();
        if let Some(c) = continuation {
            h.set(headers::CONTINUATION, c);
        }
        h.set(headers::REQUEST_CHARGE, "2.5");
        h.set(headers::QUERY_METRICS, "documentLoadTimeInMs=0.10");
        if let Some(activity) = request.headers.get(headers::ACTIVITY_ID) {
            h.set(headers::ACTIVITY_ID, activity);
        }
        Ok(FeedResponse::new(items, h))
    }

    /// Fail the next request with `error`
    pub fn inject(&self, error: QueryError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push_back(error);
        }
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<FeedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Range ids of requests routed to physical ranges, in order
    pub fn routed_range_ids(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r.target {
                RequestTarget::PartitionKeyRange { range_id, .. } => Some(range_id),
                _ => None,
            })
            .collect()
    }
}

impl Transport for SimulatedBackend {
    fn execute_request<'a>(
        &'a self,
        request: &'a FeedRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, QueryResult<FeedResponse>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            if let Ok(mut seen) = self.requests.lock() {
                seen.push(request.clone());
            }
            self.serve(request)
        })
    }
}

/// Collection, caches, backend and client wired together
pub struct Fixture {
    pub backend: Arc<SimulatedBackend>,
    pub ranges: Arc<InMemoryPartitionKeyRangeCache>,
    pub collections: Arc<InMemoryCollectionCache>,
    pub client: QueryClient,
}

impl Fixture {
    /// `layout` is `(id, min, max)` per physical range
    pub fn new(layout: &[(&str, &str, &str)], docs: Vec<String>, page_size: usize) -> Self {
        Self::with_plan(layout, docs, page_size, FixedQueryPlanProvider::full_scan())
    }

    pub fn with_plan(
        layout: &[(&str, &str, &str)],
        docs: Vec<String>,
        page_size: usize,
        plan: impl QueryPlanProvider + 'static,
    ) -> Self {
        let ranges = Arc::new(InMemoryPartitionKeyRangeCache::new());
        ranges
            .insert_collection(
                RID,
                layout
                    .iter()
                    .map(|(id, min, max)| PartitionKeyRange::new(*id, *min, *max))
                    .collect(),
            )
            .expect("complete layout");
        let collections = Arc::new(InMemoryCollectionCache::new());
        collections
            .insert(CollectionMetadata {
                resource_id: RID.to_string(),
                link: LINK.to_string(),
                partition_key: PartitionKeyDefinition::single("/pk"),
            })
            .expect("collection");
        let backend = Arc::new(SimulatedBackend {
            docs,
            page_size,
            ranges: Arc::clone(&ranges),
            faults: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        });
        let client = QueryClient::new(backend.clone(), collections.clone(), ranges.clone(), Arc::new(plan));
        Self {
            backend,
            ranges,
            collections,
            client,
        }
    }

    /// Four ranges split at 40, 80 and C0
    pub fn four_way(docs: Vec<String>, page_size: usize) -> Self {
        Self::new(
            &[("0", "", "40"), ("1", "40", "80"), ("2", "80", "C0"), ("3", "C0", "FF")],
            docs,
            page_size,
        )
    }

    /// Forced refresh of the routing map, as a client would after 410
    pub async fn refresh_routing(&self) {
        use crossfeed::routing::RoutingMapProvider;
        self.ranges
            .try_get_overlapping_ranges(RID, &Range::full(), true)
            .await
            .expect("refresh");
    }
}

/// Fast-retry configuration for a cross-partition read
pub fn config() -> ExecutionConfig {
    ExecutionConfig {
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        ..ExecutionConfig::cross_partition()
    }
}

/// Ids of a page
pub fn ids(page: &FeedResponse) -> Vec<String> {
    page.items
        .iter()
        .filter_map(|v| v["id"].as_str().map(str::to_string))
        .collect()
}

/// Fetch pages until done, returning all ids
pub async fn drain(ctx: &mut dyn DocumentQueryExecutionContext) -> QueryResult<Vec<String>> {
    let cancel = CancellationToken::new();
    let mut all = Vec::new();
    while !ctx.is_done() {
        let page = ctx.execute_next_page(&cancel).await?;
        all.extend(ids(&page));
    }
    Ok(all)
}
