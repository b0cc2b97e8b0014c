//! Execution context tests against the simulated backend

mod common;

use std::sync::Arc;

use common::{config, drain, epks, ids, Fixture, LINK};
use crossfeed::errors::QueryError;
use crossfeed::query::headers;
use crossfeed::query::{
    create_execution_context, ContextState, DefaultExecutionContext, DocumentQueryExecutionContext,
    ExecutionConfig, FeedRequest, FixedQueryPlanProvider, PartitionedQueryExecutionInfo, QueryInfo,
    RequestTarget, ResourceType, SqlQuerySpec, CURRENT_PLAN_VERSION, GATEWAY_PARTITION_ID,
};
use crossfeed::routing::Range;
use tokio_util::sync::CancellationToken;

fn all_docs(step: usize) -> Vec<String> {
    epks(step)
}

// =============================================================================
// FULL TRAVERSAL
// =============================================================================

#[tokio::test]
async fn test_read_feed_returns_every_document_once_in_order() {
    let docs = all_docs(8);
    let fixture = Fixture::four_way(docs.clone(), 3);
    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();

    let seen = drain(ctx.as_mut()).await.unwrap();
    assert_eq!(seen, docs);
    assert!(ctx.is_done());

    let routed = fixture.backend.routed_range_ids();
    let mut distinct = routed.clone();
    distinct.dedup();
    assert_eq!(distinct, vec!["0", "1", "2", "3"]);

    let snapshot = fixture.client.metrics.snapshot();
    assert_eq!(snapshot.items_returned, docs.len() as u64);
    assert_eq!(snapshot.retries, 0);
}

#[tokio::test]
async fn test_query_fan_out() {
    let docs = all_docs(16);
    let fixture = Fixture::four_way(docs.clone(), 100);
    let request = FeedRequest::query(LINK, SqlQuerySpec::new("SELECT * FROM c"));
    let mut ctx = create_execution_context(fixture.client.clone(), request, config()).unwrap();

    // One page per physical range when every range fits in a page
    let cancel = CancellationToken::new();
    let mut pages = 0;
    let mut seen = Vec::new();
    while !ctx.is_done() {
        seen.extend(ids(&ctx.execute_next_page(&cancel).await.unwrap()));
        pages += 1;
    }
    assert_eq!(pages, 4);
    assert_eq!(seen, docs);
}

#[tokio::test]
async fn test_done_context_rejects_next_page() {
    let fixture = Fixture::four_way(all_docs(64), 100);
    let mut ctx = DefaultExecutionContext::new(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
    assert_eq!(ctx.state(), ContextState::Ready);

    drain(&mut ctx).await.unwrap();
    assert_eq!(ctx.state(), ContextState::Done);
    assert_eq!(ctx.continuation(), None);

    let err = ctx.execute_next_page(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_empty_collection_is_done_after_walking_ranges() {
    let fixture = Fixture::four_way(Vec::new(), 10);
    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
    let seen = drain(ctx.as_mut()).await.unwrap();
    assert!(seen.is_empty());
    assert_eq!(fixture.backend.routed_range_ids(), vec!["0", "1", "2", "3"]);
}

// =============================================================================
// RESUME
// =============================================================================

#[tokio::test]
async fn test_resume_from_persisted_continuation() {
    let docs = all_docs(8);
    let fixture = Fixture::four_way(docs.clone(), 5);
    let cancel = CancellationToken::new();

    let mut first = DefaultExecutionContext::new(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.extend(ids(&first.execute_next_page(&cancel).await.unwrap()));
    }
    let persisted = first.continuation().unwrap().to_string();
    assert!(persisted.starts_with('['));
    drop(first);

    let mut resumed = create_execution_context(
        fixture.client.clone(),
        FeedRequest::read_feed(LINK),
        config().with_continuation(persisted),
    )
    .unwrap();
    seen.extend(drain(resumed.as_mut()).await.unwrap());
    assert_eq!(seen, docs);
}

#[tokio::test]
async fn test_malformed_continuation_is_not_retried() {
    let fixture = Fixture::four_way(all_docs(8), 5);
    let mut ctx = create_execution_context(
        fixture.client.clone(),
        FeedRequest::read_feed(LINK),
        config().with_continuation(r#"[{"range":{"min":"80","max":"FF"},"token":null},{"range":{"min":"","max":"80"},"token":null}]"#),
    )
    .unwrap();

    let err = ctx.execute_next_page(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, QueryError::MalformedContinuationToken(_)));
    assert!(fixture.backend.requests().is_empty());
    assert!(!ctx.is_done());
}

// =============================================================================
// ROUTING MODES
// =============================================================================

#[tokio::test]
async fn test_logical_partition_key_mode() {
    let fixture = Fixture::four_way(all_docs(8), 10);
    let request = FeedRequest::read_feed(LINK).with_partition_key("48");
    let mut ctx = create_execution_context(fixture.client.clone(), request, config()).unwrap();

    let page = ctx.execute_next_page(&CancellationToken::new()).await.unwrap();
    assert_eq!(ids(&page), vec!["48"]);
    assert!(page.query_metrics.contains_key("PKId(48)"));
    assert!(ctx.is_done());
    assert_eq!(fixture.backend.requests()[0].target, RequestTarget::LogicalPartition);
}

#[tokio::test]
async fn test_unpartitioned_resource_skips_routing() {
    let fixture = Fixture::four_way(all_docs(64), 10);
    let request = FeedRequest::read_feed(LINK).with_resource_type(ResourceType::Collection);
    let mut ctx = create_execution_context(fixture.client.clone(), request, config()).unwrap();

    let page = ctx.execute_next_page(&CancellationToken::new()).await.unwrap();
    assert_eq!(ids(&page).len(), 4);
    assert!(page.query_metrics.contains_key("PKId()"));
}

#[tokio::test]
async fn test_pinned_range_mode() {
    let fixture = Fixture::four_way(all_docs(8), 100);
    let mut ctx = create_execution_context(
        fixture.client.clone(),
        FeedRequest::read_feed(LINK),
        config().pinned_to("2"),
    )
    .unwrap();

    let seen = drain(ctx.as_mut()).await.unwrap();
    assert!(seen.iter().all(|epk| epk.as_str() >= "80" && epk.as_str() < "C0"));
    assert_eq!(seen.len(), 8);
    assert_eq!(fixture.backend.routed_range_ids(), vec!["2"]);
}

#[tokio::test]
async fn test_gateway_mode() {
    let docs = all_docs(32);
    let fixture = Fixture::four_way(docs.clone(), 100);
    let cfg = ExecutionConfig {
        bypass_query_parsing: true,
        ..config()
    };
    let request = FeedRequest::query(LINK, SqlQuerySpec::new("SELECT * FROM c"));
    let mut ctx = create_execution_context(fixture.client.clone(), request, cfg).unwrap();

    let page = ctx.execute_next_page(&CancellationToken::new()).await.unwrap();
    assert_eq!(ids(&page), docs);
    assert!(page.query_metrics.contains_key(GATEWAY_PARTITION_ID));
    assert!(fixture.backend.requests()[0].use_gateway_mode());
}

#[tokio::test]
async fn test_provided_ranges_skip_unmatched_partitions() {
    let plan = FixedQueryPlanProvider::new(PartitionedQueryExecutionInfo {
        version: CURRENT_PLAN_VERSION,
        query_info: QueryInfo::default(),
        query_ranges: vec![
            Range::half_open("10".to_string(), "20".to_string()),
            Range::half_open("C5".to_string(), "D0".to_string()),
        ],
    });
    let fixture = Fixture::with_plan(
        &[("0", "", "40"), ("1", "40", "80"), ("2", "80", "C0"), ("3", "C0", "FF")],
        all_docs(16),
        100,
        plan,
    );
    let request = FeedRequest::query(LINK, SqlQuerySpec::new("SELECT * FROM c WHERE c.pk IN ('a', 'b')"));
    let mut ctx = create_execution_context(fixture.client.clone(), request, config()).unwrap();

    drain(ctx.as_mut()).await.unwrap();
    assert_eq!(fixture.backend.routed_range_ids(), vec!["0", "3"]);
}

#[tokio::test]
async fn test_cross_partition_disabled() {
    let fixture = Fixture::four_way(all_docs(8), 10);
    let request = FeedRequest::query(LINK, SqlQuerySpec::new("SELECT * FROM c"));
    let mut ctx = create_execution_context(fixture.client.clone(), request, ExecutionConfig::default()).unwrap();

    let err = ctx.execute_next_page(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, QueryError::BadRequest(_)));
    assert!(fixture.backend.requests().is_empty());
}

// =============================================================================
// REQUEST HEADERS AND DIAGNOSTICS
// =============================================================================

#[tokio::test]
async fn test_request_headers_and_page_metrics() {
    let fixture = Fixture::four_way(all_docs(8), 3);
    let cfg = ExecutionConfig {
        session_token: Some("0:42".into()),
        ..config().with_max_item_count(3)
    };
    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), cfg).unwrap();
    let page = ctx.execute_next_page(&CancellationToken::new()).await.unwrap();

    let sent = &fixture.backend.requests()[0];
    assert_eq!(sent.headers.get(headers::MAX_ITEM_COUNT), Some("3"));
    assert_eq!(sent.headers.get(headers::SESSION_TOKEN), Some("0:42"));
    assert_eq!(sent.headers.get(headers::ENABLE_CROSS_PARTITION_QUERY), Some("true"));
    assert!(sent.headers.get_non_empty(headers::ACTIVITY_ID).is_some());

    let metrics = &page.query_metrics["0"];
    assert_eq!(metrics.retries, 0);
    assert_eq!(metrics.request_charge, 2.5);
    assert_eq!(metrics.fetch_execution_ranges.len(), 1);
    assert_eq!(metrics.fetch_execution_ranges[0].number_of_documents, 3);
    assert_eq!(
        metrics.fetch_execution_ranges[0].activity_id.as_deref(),
        sent.headers.get(headers::ACTIVITY_ID)
    );
    // range 0 not finished yet
    assert!(metrics.partition_scheduling_time_spans.is_empty());
}

// =============================================================================
// RETRIES AND CANCELLATION
// =============================================================================

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let docs = all_docs(64);
    let fixture = Fixture::four_way(docs.clone(), 100);
    fixture.backend.inject(QueryError::ServiceUnavailable("busy".into()));
    fixture.backend.inject(QueryError::Throttled {
        message: "slow down".into(),
        retry_after: Some(std::time::Duration::from_millis(1)),
    });

    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
    let page = ctx.execute_next_page(&CancellationToken::new()).await.unwrap();
    assert_eq!(ids(&page), vec!["00"]);
    assert_eq!(page.query_metrics["0"].retries, 2);
    assert_eq!(fixture.client.metrics.snapshot().retries, 2);
}

#[tokio::test]
async fn test_transient_budget_exhausted() {
    let fixture = Fixture::four_way(all_docs(64), 100);
    let cfg = ExecutionConfig {
        max_transient_retries: 1,
        ..config()
    };
    fixture.backend.inject(QueryError::RequestTimeout("t1".into()));
    fixture.backend.inject(QueryError::RequestTimeout("t2".into()));

    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), cfg).unwrap();
    let err = ctx.execute_next_page(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(err, QueryError::RequestTimeout("t2".into()));
    assert!(!ctx.is_done());
}

#[tokio::test]
async fn test_retry_count_restarts_after_failed_page() {
    let fixture = Fixture::four_way(all_docs(8), 3);
    fixture.backend.inject(QueryError::PartitionKeyRangeGone("0".into()));
    fixture.backend.inject(QueryError::PartitionKeyRangeGone("0".into()));

    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
    let err = ctx.execute_next_page(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, QueryError::NotFound(_)));

    let page = ctx.execute_next_page(&CancellationToken::new()).await.unwrap();
    assert_eq!(ids(&page), vec!["00", "08", "10"]);
    assert_eq!(page.query_metrics["0"].retries, 0);
}

#[tokio::test]
async fn test_session_token_dropped_after_read_session_unavailable() {
    let fixture = Fixture::four_way(all_docs(64), 100);
    fixture
        .backend
        .inject(QueryError::ReadSessionNotAvailable("replica behind".into()));
    let cfg = ExecutionConfig {
        session_token: Some("0:99".into()),
        ..config()
    };
    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), cfg).unwrap();
    ctx.execute_next_page(&CancellationToken::new()).await.unwrap();

    let requests = fixture.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].headers.get(headers::SESSION_TOKEN), Some("0:99"));
    assert_eq!(requests[1].headers.get(headers::SESSION_TOKEN), None);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fixture = Fixture::four_way(all_docs(64), 100);
    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ctx.execute_next_page(&cancel).await.unwrap_err();
    assert_eq!(err, QueryError::Cancelled);
    assert!(fixture.backend.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let fixture = Fixture::four_way(all_docs(64), 100);
    fixture.backend.inject(QueryError::Throttled {
        message: "slow down".into(),
        retry_after: Some(std::time::Duration::from_secs(3600)),
    });
    let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = ctx.execute_next_page(&cancel).await.unwrap_err();
    assert_eq!(err, QueryError::Cancelled);
    assert_eq!(fixture.backend.requests().len(), 1);
}

#[tokio::test]
async fn test_shared_metrics_registry() {
    let fixture = Fixture::four_way(all_docs(64), 100);
    let metrics = Arc::clone(&fixture.client.metrics);
    for _ in 0..2 {
        let mut ctx = create_execution_context(fixture.client.clone(), FeedRequest::read_feed(LINK), config()).unwrap();
        drain(ctx.as_mut()).await.unwrap();
    }
    assert_eq!(metrics.snapshot().pages_fetched, 8);
    assert_eq!(metrics.snapshot().items_returned, 8);
}
