//! Observable routing events
//!
//! Events are explicit and typed; the string form is the `event` field
//! of a log line.

use std::fmt;

use super::logger::Severity;

/// Events emitted by the routing protocol and execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingEvent {
    // Continuation handling
    /// Continuation header parsed into composite tokens
    ContinuationParsed,
    /// Continuation header rejected
    ContinuationMalformed,
    /// Legacy scalar continuation wrapped over the full range
    ContinuationLegacy,

    // Range resolution
    /// Target physical range resolved from a continuation
    RangeResolved,
    /// A range from the continuation was split into children
    SplitDetected,
    /// A range from the continuation is now covered by a wider range
    MergeDetected,
    /// Collection or range could not be resolved
    CollectionUnresolvable,

    // Retry
    /// Routing map force-refreshed after a gone error
    GoneRefresh,
    /// Name cache refresh requested
    NameCacheRefresh,
    /// Retry scheduled after a failure
    RetryScheduled,
    /// Retry chain gave up
    RetryExhausted,

    // Paging
    /// A page was fetched from one partition
    PageFetched,
    /// The context drained the whole keyspace
    ContextDone,
}

impl RoutingEvent {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingEvent::ContinuationParsed => "CONTINUATION_PARSED",
            RoutingEvent::ContinuationMalformed => "CONTINUATION_MALFORMED",
            RoutingEvent::ContinuationLegacy => "CONTINUATION_LEGACY",
            RoutingEvent::RangeResolved => "RANGE_RESOLVED",
            RoutingEvent::SplitDetected => "SPLIT_DETECTED",
            RoutingEvent::MergeDetected => "MERGE_DETECTED",
            RoutingEvent::CollectionUnresolvable => "COLLECTION_UNRESOLVABLE",
            RoutingEvent::GoneRefresh => "GONE_REFRESH",
            RoutingEvent::NameCacheRefresh => "NAME_CACHE_REFRESH",
            RoutingEvent::RetryScheduled => "RETRY_SCHEDULED",
            RoutingEvent::RetryExhausted => "RETRY_EXHAUSTED",
            RoutingEvent::PageFetched => "PAGE_FETCHED",
            RoutingEvent::ContextDone => "CONTEXT_DONE",
        }
    }

    /// Default severity for this event
    pub fn severity(&self) -> Severity {
        match self {
            RoutingEvent::ContinuationParsed
            | RoutingEvent::RangeResolved
            | RoutingEvent::PageFetched => Severity::Trace,
            RoutingEvent::ContinuationLegacy
            | RoutingEvent::ContextDone
            | RoutingEvent::SplitDetected
            | RoutingEvent::MergeDetected
            | RoutingEvent::GoneRefresh
            | RoutingEvent::NameCacheRefresh
            | RoutingEvent::RetryScheduled => Severity::Info,
            RoutingEvent::ContinuationMalformed | RoutingEvent::CollectionUnresolvable => {
                Severity::Warn
            }
            RoutingEvent::RetryExhausted => Severity::Error,
        }
    }
}

impl fmt::Display for RoutingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
