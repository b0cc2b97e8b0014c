//! Sequential execution context
//!
//! Visits the partitions of a collection one at a time. Each call to
//! `execute_next_page` sends requests to exactly one physical range
//! (retrying as the retry chain allows) and returns one page whose
//! continuation resumes the walk.
//!
//! State machine: `Ready -> Executing -> (Ready | Done)`. A context is
//! done exactly when the last page carried no continuation. A failed
//! page leaves the context `Ready` at its previous continuation.
//!
//! Contexts are not internally synchronized; callers must not overlap
//! calls on one context.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::ExecutionConfig;
use super::headers;
use super::metrics::{ClientSideMetrics, FetchExecutionRangeAccumulator, SchedulingStopwatch};
use super::plan::QueryPlanProvider;
use super::request::{FeedRequest, OperationType, RequestTarget};
use super::response::FeedResponse;
use super::transport::Transport;
use crate::errors::{QueryError, QueryResult};
use crate::observability::{log_event, RoutingEvent, RoutingMetrics};
use crate::retry::{self, RetryDecision};
use crate::routing::{
    get_provided_partition_key_ranges, BoxFuture, CollectionCache, CollectionMetadata, ExtractedContinuation,
    PartitionKeyRangeCache, PartitionRoutingHelper, ProvidedRangesRequest, Range, ResolvedRangeInfo,
};

/// Partition identifier for requests forced through the gateway
pub const GATEWAY_PARTITION_ID: &str = "Gateway";

/// A paged feed over a collection
pub trait DocumentQueryExecutionContext: Send {
    /// Fetch the next page.
    ///
    /// Fails with `InvalidOperation` once the feed is done and with
    /// `Cancelled` when `cancel` fires before an attempt starts.
    fn execute_next_page<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, QueryResult<FeedResponse>>;

    fn is_done(&self) -> bool;
}

/// Collaborators shared by every context of one client
#[derive(Clone)]
pub struct QueryClient {
    pub transport: Arc<dyn Transport>,
    pub collection_cache: Arc<dyn CollectionCache>,
    pub partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
    pub query_plan_provider: Arc<dyn QueryPlanProvider>,
    pub metrics: Arc<RoutingMetrics>,
}

impl QueryClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        collection_cache: Arc<dyn CollectionCache>,
        partition_key_range_cache: Arc<dyn PartitionKeyRangeCache>,
        query_plan_provider: Arc<dyn QueryPlanProvider>,
    ) -> Self {
        Self {
            transport,
            collection_cache,
            partition_key_range_cache,
            query_plan_provider,
            metrics: Arc::new(RoutingMetrics::new()),
        }
    }

    /// Share an existing counter registry
    pub fn with_metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Ready,
    Executing,
    Done,
}

/// The default, sequential execution context
#[derive(Debug)]
pub struct DefaultExecutionContext {
    client: QueryClient,
    config: ExecutionConfig,
    template: FeedRequest,
    continuation: Option<String>,
    state: ContextState,
    /// Attempts since the last successful page, -1 when none are in flight
    retries: i64,
    /// Logical ranges per collection resource id
    provided_ranges_cache: HashMap<String, Vec<Range<String>>>,
    fetch_ranges: FetchExecutionRangeAccumulator,
    scheduling: SchedulingStopwatch,
    helper: PartitionRoutingHelper,
}

impl DefaultExecutionContext {
    /// Create a context for `request`
    pub fn new(client: QueryClient, request: FeedRequest, config: ExecutionConfig) -> QueryResult<Self> {
        config.validate()?;
        let helper = PartitionRoutingHelper::with_metrics(Arc::clone(&client.metrics));
        Ok(Self {
            continuation: config.initial_continuation.clone().filter(|c| !c.trim().is_empty()),
            client,
            config,
            template: request,
            state: ContextState::Ready,
            retries: -1,
            provided_ranges_cache: HashMap::new(),
            fetch_ranges: FetchExecutionRangeAccumulator::new(),
            scheduling: SchedulingStopwatch::new(),
            helper,
        })
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Continuation to persist for resuming this feed
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    async fn next_page(&mut self, cancel: &CancellationToken) -> QueryResult<FeedResponse> {
        if self.state == ContextState::Done {
            return Err(QueryError::InvalidOperation(
                "Feed is done; no more pages can be fetched".to_string(),
            ));
        }

        self.state = ContextState::Executing;
        self.retries = -1;
        self.scheduling.start();
        let result = self.run_with_retries(cancel).await;
        self.scheduling.stop();

        match result {
            Ok(page) => {
                self.continuation = page.continuation().map(str::to_string);
                if self.continuation.is_none() {
                    self.state = ContextState::Done;
                    log_event(RoutingEvent::ContextDone, &[("collection_link", &self.template.collection_link)]);
                } else {
                    self.state = ContextState::Ready;
                }
                Ok(page)
            }
            Err(e) => {
                self.state = ContextState::Ready;
                Err(e)
            }
        }
    }

    async fn run_with_retries(&mut self, cancel: &CancellationToken) -> QueryResult<FeedResponse> {
        let client = self.client.clone();
        let mut chain = retry::standard_chain(
            &self.config,
            self.template.resource_type.is_partitioned(),
            &client.collection_cache,
            &client.partition_key_range_cache,
            &self.template.collection_link,
            &client.metrics,
        );

        loop {
            if cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }

            self.fetch_ranges.begin_fetch_range();
            self.retries += 1;
            let mut request = self.create_request();
            chain.on_before_send_request(&mut request);

            let error = match self.execute_once(request, cancel).await {
                Ok((response, partition_id)) => return Ok(self.finish_page(response, partition_id)),
                Err(e) => e,
            };

            match chain.should_retry(&error).await {
                RetryDecision::RetryAfter(delay) => {
                    client.metrics.increment_retries();
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => return Err(QueryError::Cancelled),
                        }
                    }
                }
                RetryDecision::NoRetry(replacement) => return Err(replacement.unwrap_or(error)),
                RetryDecision::Delegate => return Err(error),
            }
        }
    }

    fn create_request(&self) -> FeedRequest {
        let mut request = self.template.clone();
        request.target = RequestTarget::LogicalPartition;
        request.force_name_cache_refresh = false;
        request
            .headers
            .set_or_remove(headers::CONTINUATION, self.continuation.clone());
        request.headers.set(headers::ACTIVITY_ID, Uuid::new_v4().to_string());
        request.headers.set(
            headers::IS_CONTINUATION_EXPECTED,
            self.config.is_continuation_expected.to_string(),
        );
        request.headers.set(
            headers::ENABLE_CROSS_PARTITION_QUERY,
            self.config.enable_cross_partition_query.to_string(),
        );
        if let Some(max) = self.config.max_item_count {
            request.headers.set(headers::MAX_ITEM_COUNT, max.to_string());
        }
        if let Some(session) = &self.config.session_token {
            request.headers.set(headers::SESSION_TOKEN, session.clone());
        }
        request
    }

    /// One attempt; returns the page and the partition identifier that served it
    async fn execute_once(
        &mut self,
        mut request: FeedRequest,
        cancel: &CancellationToken,
    ) -> QueryResult<(FeedResponse, String)> {
        let client = self.client.clone();

        if request.partition_key().is_some() || !request.resource_type.is_partitioned() {
            let partition_id = format!("PKId({})", request.partition_key().unwrap_or_default());
            let response = client.transport.execute_request(&request, cancel).await?;
            return Ok((response, partition_id));
        }

        if let Some(range_id) = self.config.partition_key_range_id.clone() {
            let collection = self.resolve_collection(&request, request.force_name_cache_refresh).await?;
            request.route_to(collection.resource_id, range_id.clone());
            let response = client.transport.execute_request(&request, cancel).await?;
            return Ok((response, range_id));
        }

        if self.config.bypass_query_parsing {
            request.target = RequestTarget::Gateway;
            let response = client.transport.execute_request(&request, cancel).await?;
            return Ok((response, GATEWAY_PARTITION_ID.to_string()));
        }

        // Fan-out, one physical range per page
        let mut collection = self.resolve_collection(&request, request.force_name_cache_refresh).await?;
        let extracted = self.helper.extract_continuation_tokens(&request.headers)?;
        let mut routing = self.try_get_target_range(&request, &collection, &extracted).await?;
        if routing.is_none() {
            client.metrics.increment_name_cache_refreshes();
            log_event(
                RoutingEvent::NameCacheRefresh,
                &[
                    ("collection_link", &request.collection_link),
                    ("collection_rid", &collection.resource_id),
                ],
            );
            request.force_name_cache_refresh = true;
            collection = self.resolve_collection(&request, true).await?;
            routing = self.try_get_target_range(&request, &collection, &extracted).await?;
        }

        let (resolved, provided) = routing.ok_or_else(|| {
            QueryError::not_found(format!(
                "No routing for collection {} with continuation {}",
                collection.resource_id,
                request.continuation().unwrap_or("<none>")
            ))
        })?;
        let target = resolved
            .resolved_range
            .clone()
            .ok_or_else(|| QueryError::Internal("resolved range is required".to_string()))?;

        request.route_to(collection.resource_id.clone(), target.id.clone());
        request.headers.set_or_remove(
            headers::CONTINUATION,
            resolved.current_token().and_then(|t| t.token.clone()),
        );
        request.set_epk_scope(resolved.scoped_range().as_ref());

        let mut response = client.transport.execute_request(&request, cancel).await?;

        let advanced = self
            .helper
            .add_partition_key_range_to_continuation_token(
                &mut response.headers,
                &provided,
                client.partition_key_range_cache.as_ref(),
                &collection.resource_id,
                &resolved,
            )
            .await?;
        if !advanced {
            return Err(QueryError::not_found(format!(
                "Next range of collection {} could not be resolved",
                collection.resource_id
            )));
        }

        Ok((response, target.id))
    }

    async fn resolve_collection(&self, request: &FeedRequest, force_refresh: bool) -> QueryResult<CollectionMetadata> {
        self.client
            .collection_cache
            .resolve_collection(&request.collection_link, force_refresh)
            .await
    }

    async fn try_get_target_range(
        &mut self,
        request: &FeedRequest,
        collection: &CollectionMetadata,
        extracted: &ExtractedContinuation,
    ) -> QueryResult<Option<(ResolvedRangeInfo, Vec<Range<String>>)>> {
        let provided = match self.provided_ranges_cache.get(&collection.resource_id) {
            Some(ranges) => ranges.clone(),
            None => {
                let ranges = self.provided_ranges(request, collection)?;
                self.provided_ranges_cache
                    .insert(collection.resource_id.clone(), ranges.clone());
                ranges
            }
        };

        let resolved = self
            .helper
            .resolve_target_range(
                &provided,
                self.client.partition_key_range_cache.as_ref(),
                &collection.resource_id,
                &extracted.range,
                extracted.tokens.clone(),
            )
            .await?;
        if resolved.resolved_range.is_none() {
            return Ok(None);
        }
        Ok(Some((resolved, provided)))
    }

    fn provided_ranges(&self, request: &FeedRequest, collection: &CollectionMetadata) -> QueryResult<Vec<Range<String>>> {
        let enable_cross_partition_query = match request.headers.get(headers::ENABLE_CROSS_PARTITION_QUERY) {
            Some(value) => value.trim().parse::<bool>().map_err(|_| {
                QueryError::bad_request(format!(
                    "Invalid value {} for header {}",
                    value,
                    headers::ENABLE_CROSS_PARTITION_QUERY
                ))
            })?,
            None => false,
        };
        let query = match request.operation {
            OperationType::Query => request.query.as_ref(),
            OperationType::ReadFeed => None,
        };
        get_provided_partition_key_ranges(
            &ProvidedRangesRequest {
                query,
                effective_partition_key: request.effective_partition_key.as_deref(),
                enable_cross_partition_query,
                is_continuation_expected: self.config.is_continuation_expected,
                partition_key: &collection.partition_key,
            },
            self.client.query_plan_provider.as_ref(),
        )
    }

    fn finish_page(&mut self, mut response: FeedResponse, partition_id: String) -> FeedResponse {
        let items = response.item_count() as u64;

        if let Some(backend_metrics) = response.backend_query_metrics().map(str::to_string) {
            self.fetch_ranges.end_fetch_range(
                &partition_id,
                response.activity_id(),
                items,
                self.retries,
            );
            let scheduling = if response.continuation().is_none() {
                vec![(partition_id.clone(), self.scheduling.elapsed())]
            } else {
                Vec::new()
            };
            let metrics = ClientSideMetrics {
                retries: self.retries,
                request_charge: response.request_charge(),
                fetch_execution_ranges: self.fetch_ranges.get_execution_ranges(),
                partition_scheduling_time_spans: scheduling,
                backend_metrics,
            };
            response.query_metrics.insert(partition_id.clone(), metrics);
        }

        self.client.metrics.record_page(items);
        log_event(
            RoutingEvent::PageFetched,
            &[
                ("items", &items.to_string()),
                ("partition_id", &partition_id),
                ("retries", &self.retries.to_string()),
            ],
        );
        self.retries = -1;
        response
    }
}

impl DocumentQueryExecutionContext for DefaultExecutionContext {
    fn execute_next_page<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, QueryResult<FeedResponse>> {
        Box::pin(self.next_page(cancel))
    }

    fn is_done(&self) -> bool {
        self.state == ContextState::Done
    }
}

/// Create the execution context for a request
pub fn create_execution_context(
    client: QueryClient,
    request: FeedRequest,
    config: ExecutionConfig,
) -> QueryResult<Box<dyn DocumentQueryExecutionContext>> {
    Ok(Box::new(DefaultExecutionContext::new(client, request, config)?))
}
