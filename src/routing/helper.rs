//! Partition routing protocol
//!
//! Drives a cross-partition feed one physical range at a time:
//!
//! 1. `extract_continuation_tokens` turns the request continuation into
//!    a composite token list and the range to target next.
//! 2. `resolve_target_range` maps that range onto the current physical
//!    layout, repairing the token list after splits and merges.
//! 3. `add_partition_key_range_to_continuation_token` rewrites the
//!    response continuation so the caller can resume at the right range.
//!
//! Token ranges always describe the unvisited key space. When a token
//! range is narrower than the physical range it resolves to (after a
//! merge, or when resuming inside a range) the request is scoped to the
//! token range with start/end EPK headers.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::continuation::CompositeContinuationToken;
use crate::errors::{QueryError, QueryResult};
use crate::observability::{log_event, RoutingEvent, RoutingMetrics};
use crate::query::headers::{self, Headers};

use super::partition_key_range::PartitionKeyRange;
use super::provider::RoutingMapProvider;
use super::range::{Range, MAXIMUM_EXCLUSIVE_EPK, MINIMUM_INCLUSIVE_EPK};

/// Continuation state read from request headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContinuation {
    /// Range of the first composite token; the full range when starting over
    pub range: Range<String>,
    /// All composite tokens, empty when starting over
    pub tokens: Vec<CompositeContinuationToken>,
}

impl ExtractedContinuation {
    /// Whether the feed starts from the beginning of the key space
    pub fn is_start(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// The physical range to target next plus the token queue.
///
/// When `continuation_tokens` is non-empty its first entry is the token
/// of the range being read by this request; the rest are queued ranges
/// in visiting order. `resolved_range == None` means the continuation
/// matches no live range and resolution must be retried after a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRangeInfo {
    pub resolved_range: Option<PartitionKeyRange>,
    pub continuation_tokens: Vec<CompositeContinuationToken>,
}

impl ResolvedRangeInfo {
    pub fn new(resolved_range: Option<PartitionKeyRange>, continuation_tokens: Vec<CompositeContinuationToken>) -> Self {
        Self {
            resolved_range,
            continuation_tokens,
        }
    }

    /// Token of the range this request reads
    pub fn current_token(&self) -> Option<&CompositeContinuationToken> {
        self.continuation_tokens.first()
    }

    /// Tokens queued after the current one
    pub fn remaining_tokens(&self) -> &[CompositeContinuationToken] {
        self.continuation_tokens.get(1..).unwrap_or(&[])
    }

    /// Sub-range to read when the token range is narrower than the
    /// resolved physical range
    pub fn scoped_range(&self) -> Option<Range<String>> {
        let physical = self.resolved_range.as_ref()?.to_range();
        let token_range = &self.current_token()?.range;
        if *token_range != physical && physical.contains_range(token_range) {
            Some(token_range.clone())
        } else {
            None
        }
    }
}

/// Stateless routing protocol; counters are optional
#[derive(Debug, Clone, Default)]
pub struct PartitionRoutingHelper {
    metrics: Option<Arc<RoutingMetrics>>,
}

impl PartitionRoutingHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Helper that reports splits and merges to `metrics`
    pub fn with_metrics(metrics: Arc<RoutingMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }

    /// Parse the request continuation into composite tokens. Pure; the
    /// headers are not modified.
    pub fn extract_continuation_tokens(&self, request_headers: &Headers) -> QueryResult<ExtractedContinuation> {
        let raw = match request_headers.get_non_empty(headers::CONTINUATION) {
            Some(raw) => raw.to_string(),
            None => {
                return Ok(ExtractedContinuation {
                    range: Range::full(),
                    tokens: Vec::new(),
                });
            }
        };

        let tokens = match CompositeContinuationToken::parse_list(&raw) {
            Ok(tokens) => tokens,
            Err(e) => {
                log_event(
                    RoutingEvent::ContinuationMalformed,
                    &[("continuation", &raw), ("reason", &e.to_string())],
                );
                return Err(e);
            }
        };

        let trimmed = raw.trim_start();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            log_event(RoutingEvent::ContinuationLegacy, &[("continuation", &raw)]);
        }

        let first = &tokens[0];
        log_event(
            RoutingEvent::ContinuationParsed,
            &[("range", &first.range.to_string()), ("tokens", &tokens.len().to_string())],
        );

        Ok(ExtractedContinuation {
            range: first.range.clone(),
            tokens,
        })
    }

    /// Map the range from the continuation onto the current physical layout.
    ///
    /// - no provided ranges: the range owning the minimum EPK
    /// - no supplied tokens: the range owning the lowest provided range
    /// - the token range is owned by one physical range: that range
    /// - the token range now spans several ranges (split): one token per
    ///   child, the first child inheriting the backend continuation
    /// - the token range sits inside a wider range (merge): that range,
    ///   keeping the token's continuation and scoping the read
    pub async fn resolve_target_range<P>(
        &self,
        provided_ranges: &[Range<String>],
        routing_map_provider: &P,
        collection_rid: &str,
        range_from_token: &Range<String>,
        supplied_tokens: Vec<CompositeContinuationToken>,
    ) -> QueryResult<ResolvedRangeInfo>
    where
        P: RoutingMapProvider + ?Sized,
    {
        if provided_ranges.is_empty() {
            let range = routing_map_provider
                .try_get_range_by_effective_partition_key(collection_rid, MINIMUM_INCLUSIVE_EPK)
                .await?;
            return Ok(ResolvedRangeInfo::new(range, supplied_tokens));
        }

        if supplied_tokens.is_empty() {
            let minimum = provided_ranges
                .iter()
                .min_by(|a, b| Range::cmp_by_min(a, b))
                .map(|r| r.min.clone())
                .unwrap_or_default();
            let range = routing_map_provider
                .try_get_range_by_effective_partition_key(collection_rid, &minimum)
                .await?;
            if range.is_none() {
                self.log_unresolvable(collection_rid, range_from_token);
            }
            return Ok(ResolvedRangeInfo::new(range, supplied_tokens));
        }

        let cached = routing_map_provider
            .try_get_overlapping_ranges(collection_rid, range_from_token, false)
            .await?;
        if let Some(target) = cached.as_deref().and_then(|r| Self::single_owner(r, range_from_token)) {
            log_event(
                RoutingEvent::RangeResolved,
                &[("range", &range_from_token.to_string()), ("range_id", &target.id)],
            );
            return Ok(ResolvedRangeInfo::new(Some(target.clone()), supplied_tokens));
        }

        // Layout changed since the token was written, or the cache is stale
        let replaced = routing_map_provider
            .try_get_overlapping_ranges(collection_rid, range_from_token, true)
            .await?
            .unwrap_or_default();
        if !Self::covers(&replaced, range_from_token) {
            self.log_unresolvable(collection_rid, range_from_token);
            return Ok(ResolvedRangeInfo::new(None, supplied_tokens));
        }

        if let Some(target) = Self::single_owner(&replaced, range_from_token) {
            if target.to_range() != *range_from_token {
                if let Some(metrics) = &self.metrics {
                    metrics.increment_merges();
                }
                log_event(
                    RoutingEvent::MergeDetected,
                    &[("range", &range_from_token.to_string()), ("range_id", &target.id)],
                );
            }
            return Ok(ResolvedRangeInfo::new(Some(target.clone()), supplied_tokens));
        }

        // A legacy full-range token also spans several ranges; only
        // children of one retired range count as a split
        if let Some(parent) = Self::common_parent(&replaced) {
            if let Some(metrics) = &self.metrics {
                metrics.increment_splits();
            }
            let child_ids: Vec<&str> = replaced.iter().map(|r| r.id.as_str()).collect();
            log_event(
                RoutingEvent::SplitDetected,
                &[
                    ("children", &child_ids.join(",")),
                    ("parent", parent),
                    ("range", &range_from_token.to_string()),
                ],
            );
        }

        let mut tokens = Vec::with_capacity(replaced.len() + supplied_tokens.len() - 1);
        let mut supplied = supplied_tokens.into_iter();
        let inherited = supplied.next().and_then(|t| t.token);
        for (index, child) in replaced.iter().enumerate() {
            let child_range = child
                .to_range()
                .intersect(range_from_token)
                .ok_or_else(|| QueryError::Internal(format!("Range {} does not overlap {}", child.id, range_from_token)))?;
            let token = if index == 0 { inherited.clone() } else { None };
            tokens.push(CompositeContinuationToken::new(child_range, token));
        }
        tokens.extend(supplied);

        Ok(ResolvedRangeInfo::new(replaced.into_iter().next(), tokens))
    }

    /// Rewrite the response continuation after reading one range.
    ///
    /// Returns `false` when the next range cannot be resolved, which means
    /// the collection resource id is likely stale.
    pub async fn add_partition_key_range_to_continuation_token<P>(
        &self,
        response_headers: &mut Headers,
        provided_ranges: &[Range<String>],
        routing_map_provider: &P,
        collection_rid: &str,
        resolved_range_info: &ResolvedRangeInfo,
    ) -> QueryResult<bool>
    where
        P: RoutingMapProvider + ?Sized,
    {
        let current = resolved_range_info
            .resolved_range
            .as_ref()
            .ok_or_else(|| QueryError::Internal("resolved range is required".to_string()))?;
        let backend = response_headers
            .get_non_empty(headers::CONTINUATION)
            .map(str::to_string);
        let mut tokens = resolved_range_info.continuation_tokens.clone();

        // Several ranges queued (split, or a multi-range continuation)
        if tokens.len() > 1 {
            match backend {
                Some(backend) => tokens[0].token = Some(backend),
                None => {
                    tokens.remove(0);
                }
            }
            let wire = CompositeContinuationToken::serialize_list(&tokens)?;
            response_headers.set(headers::CONTINUATION, wire);
            return Ok(true);
        }

        let current_range = tokens
            .first()
            .map(|t| t.range.clone())
            .unwrap_or_else(|| current.to_range());

        if let Some(backend) = backend {
            let wire = CompositeContinuationToken::serialize_list(&[CompositeContinuationToken::new(
                current_range,
                Some(backend),
            )])?;
            response_headers.set(headers::CONTINUATION, wire);
            return Ok(true);
        }

        // Range exhausted: move to the range after it
        let next_provided = provided_ranges
            .iter()
            .filter(|r| Range::cmp_by_max(r, &current_range) == Ordering::Greater)
            .min_by(|a, b| Range::cmp_by_max(a, b));
        let next_provided = match next_provided {
            Some(range) => range,
            None => {
                response_headers.remove(headers::CONTINUATION);
                return Ok(true);
            }
        };

        let cursor = if next_provided.min > current_range.max {
            next_provided.min.clone()
        } else {
            current_range.max.clone()
        };
        if cursor.as_str() >= MAXIMUM_EXCLUSIVE_EPK {
            response_headers.remove(headers::CONTINUATION);
            return Ok(true);
        }

        let next_range = match routing_map_provider
            .try_get_range_by_effective_partition_key(collection_rid, &cursor)
            .await?
        {
            Some(range) => range,
            None => {
                self.log_unresolvable(collection_rid, &current_range);
                return Ok(false);
            }
        };

        let start = if next_range.min_inclusive > cursor {
            next_range.min_inclusive.clone()
        } else {
            cursor
        };
        let next_token = CompositeContinuationToken::fresh(Range::half_open(start, next_range.max_exclusive));
        let wire = CompositeContinuationToken::serialize_list(&[next_token])?;
        response_headers.set(headers::CONTINUATION, wire);
        Ok(true)
    }

    /// The one physical range that fully contains `range`, if any
    /// Most recent parent shared by every range, if any
    fn common_parent(ranges: &[PartitionKeyRange]) -> Option<&str> {
        let (first, rest) = ranges.split_first()?;
        first
            .parents
            .iter()
            .rev()
            .find(|p| rest.iter().all(|r| r.parents.contains(*p)))
            .map(String::as_str)
    }

    fn single_owner<'r>(ranges: &'r [PartitionKeyRange], range: &Range<String>) -> Option<&'r PartitionKeyRange> {
        match ranges {
            [only] if only.to_range().contains_range(range) => Some(only),
            _ => None,
        }
    }

    /// Whether `ranges` tile `range` without gaps
    fn covers(ranges: &[PartitionKeyRange], range: &Range<String>) -> bool {
        let (first, last) = match (ranges.first(), ranges.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return false,
        };
        first.min_inclusive <= range.min
            && last.max_exclusive >= range.max
            && ranges.windows(2).all(|p| p[0].max_exclusive == p[1].min_inclusive)
    }

    fn log_unresolvable(&self, collection_rid: &str, range: &Range<String>) {
        log_event(
            RoutingEvent::CollectionUnresolvable,
            &[("collection_rid", collection_rid), ("range", &range.to_string())],
        );
    }
}
