//! Error taxonomy for query routing
//!
//! Every variant maps to the wire status / sub-status pair the service
//! would return for the same condition, so retry stages can classify
//! errors without inspecting messages.
//!
//! Retry behavior per variant:
//! - MalformedContinuationToken, BadRequest, NotFound: never retried
//! - PartitionKeyRangeGone: retried once after a forced routing refresh
//! - NameCacheIsStale: retried once after a forced name cache refresh
//! - ReadSessionNotAvailable: retried once without a session token
//! - RequestTimeout, Throttled, ServiceUnavailable: transient backoff

use std::time::Duration;

use thiserror::Error;

/// Result type for routing and execution operations
pub type QueryResult<T> = Result<T, QueryError>;

/// HTTP status codes surfaced by the service
pub mod status {
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const GONE: u16 = 410;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// Sub-status codes that refine a status
pub mod sub_status {
    pub const UNKNOWN: u32 = 0;
    /// 410: the collection was resolved through a stale name cache
    pub const NAME_CACHE_IS_STALE: u32 = 1000;
    /// 410: the physical range no longer exists (split or merge)
    pub const PARTITION_KEY_RANGE_GONE: u32 = 1002;
    /// 404: the replica has not caught up with the session token
    pub const READ_SESSION_NOT_AVAILABLE: u32 = 1002;
    /// 400: the query needs client-side processing the gateway cannot do
    pub const CROSS_PARTITION_QUERY_NOT_SERVABLE: u32 = 1004;
}

/// Errors raised while routing or executing a feed request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    // ==================
    // Client errors
    // ==================
    /// Continuation cannot be parsed or violates sort/overlap rules
    #[error("Malformed continuation token: {0}")]
    MalformedContinuationToken(String),

    /// Request is invalid for this collection
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Query needs client-side processing that this path cannot provide
    #[error("Cross partition query not servable: {0}")]
    CrossPartitionQueryNotServable(String),

    /// Operation is not valid in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // ==================
    // Resource errors
    // ==================
    /// Collection or range no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// Replica has not caught up with the session token
    #[error("Read session not available: {0}")]
    ReadSessionNotAvailable(String),

    /// Physical range was split or merged away
    #[error("Partition key range gone: {0}")]
    PartitionKeyRangeGone(String),

    /// Collection resource id came from a stale name cache
    #[error("Name cache is stale: {0}")]
    NameCacheIsStale(String),

    // ==================
    // Transient errors
    // ==================
    /// Request timed out
    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    /// Request rate too large
    #[error("Throttled: {message}")]
    Throttled {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Service temporarily unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    // ==================
    // Other
    // ==================
    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Build an error from a raw wire status.
    ///
    /// Unknown combinations map to `Internal` with the status preserved
    /// in the message.
    pub fn from_status(status: u16, sub_status: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match (status, sub_status) {
            (status::BAD_REQUEST, sub_status::CROSS_PARTITION_QUERY_NOT_SERVABLE) => {
                QueryError::CrossPartitionQueryNotServable(message)
            }
            (status::BAD_REQUEST, _) => QueryError::BadRequest(message),
            (status::NOT_FOUND, sub_status::READ_SESSION_NOT_AVAILABLE) => {
                QueryError::ReadSessionNotAvailable(message)
            }
            (status::NOT_FOUND, _) => QueryError::NotFound(message),
            (status::REQUEST_TIMEOUT, _) => QueryError::RequestTimeout(message),
            (status::GONE, sub_status::PARTITION_KEY_RANGE_GONE) => {
                QueryError::PartitionKeyRangeGone(message)
            }
            (status::GONE, sub_status::NAME_CACHE_IS_STALE) => QueryError::NameCacheIsStale(message),
            (status::TOO_MANY_REQUESTS, _) => QueryError::Throttled {
                message,
                retry_after: None,
            },
            (status::SERVICE_UNAVAILABLE, _) => QueryError::ServiceUnavailable(message),
            (status, sub_status) => {
                QueryError::Internal(format!("{} (status {}/{})", message, status, sub_status))
            }
        }
    }

    /// Create a malformed continuation error
    pub fn malformed_continuation(reason: impl Into<String>) -> Self {
        QueryError::MalformedContinuationToken(reason.into())
    }

    /// Create a not found error
    pub fn not_found(reason: impl Into<String>) -> Self {
        QueryError::NotFound(reason.into())
    }

    /// Create a bad request error
    pub fn bad_request(reason: impl Into<String>) -> Self {
        QueryError::BadRequest(reason.into())
    }

    /// Wire status code
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::MalformedContinuationToken(_) => status::BAD_REQUEST,
            QueryError::BadRequest(_) => status::BAD_REQUEST,
            QueryError::CrossPartitionQueryNotServable(_) => status::BAD_REQUEST,
            QueryError::InvalidOperation(_) => status::BAD_REQUEST,
            QueryError::NotFound(_) => status::NOT_FOUND,
            QueryError::ReadSessionNotAvailable(_) => status::NOT_FOUND,
            QueryError::PartitionKeyRangeGone(_) => status::GONE,
            QueryError::NameCacheIsStale(_) => status::GONE,
            QueryError::RequestTimeout(_) => status::REQUEST_TIMEOUT,
            QueryError::Throttled { .. } => status::TOO_MANY_REQUESTS,
            QueryError::ServiceUnavailable(_) => status::SERVICE_UNAVAILABLE,
            QueryError::Cancelled => status::REQUEST_TIMEOUT,
            QueryError::Internal(_) => status::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire sub-status code
    pub fn sub_status_code(&self) -> u32 {
        match self {
            QueryError::CrossPartitionQueryNotServable(_) => {
                sub_status::CROSS_PARTITION_QUERY_NOT_SERVABLE
            }
            QueryError::ReadSessionNotAvailable(_) => sub_status::READ_SESSION_NOT_AVAILABLE,
            QueryError::PartitionKeyRangeGone(_) => sub_status::PARTITION_KEY_RANGE_GONE,
            QueryError::NameCacheIsStale(_) => sub_status::NAME_CACHE_IS_STALE,
            _ => sub_status::UNKNOWN,
        }
    }

    /// Stable string code for logs
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::MalformedContinuationToken(_) => "MALFORMED_CONTINUATION_TOKEN",
            QueryError::BadRequest(_) => "BAD_REQUEST",
            QueryError::CrossPartitionQueryNotServable(_) => "CROSS_PARTITION_QUERY_NOT_SERVABLE",
            QueryError::InvalidOperation(_) => "INVALID_OPERATION",
            QueryError::NotFound(_) => "NOT_FOUND",
            QueryError::ReadSessionNotAvailable(_) => "READ_SESSION_NOT_AVAILABLE",
            QueryError::PartitionKeyRangeGone(_) => "PARTITION_KEY_RANGE_GONE",
            QueryError::NameCacheIsStale(_) => "NAME_CACHE_IS_STALE",
            QueryError::RequestTimeout(_) => "REQUEST_TIMEOUT",
            QueryError::Throttled { .. } => "THROTTLED",
            QueryError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            QueryError::Cancelled => "CANCELLED",
            QueryError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the transient stage may retry this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QueryError::RequestTimeout(_)
                | QueryError::Throttled { .. }
                | QueryError::ServiceUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(QueryError::malformed_continuation("x").status_code(), 400);
        assert_eq!(QueryError::not_found("c").status_code(), 404);
        assert_eq!(
            QueryError::PartitionKeyRangeGone("1".into()).status_code(),
            410
        );
        assert_eq!(
            QueryError::PartitionKeyRangeGone("1".into()).sub_status_code(),
            1002
        );
        assert_eq!(QueryError::NameCacheIsStale("c".into()).sub_status_code(), 1000);
    }

    #[test]
    fn test_from_status_round_trips_classification() {
        let err = QueryError::from_status(410, 1002, "range 3 gone");
        assert!(matches!(err, QueryError::PartitionKeyRangeGone(_)));

        let err = QueryError::from_status(404, 1002, "session");
        assert!(matches!(err, QueryError::ReadSessionNotAvailable(_)));

        let err = QueryError::from_status(404, 0, "collection");
        assert!(matches!(err, QueryError::NotFound(_)));

        let err = QueryError::from_status(418, 7, "teapot");
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("418/7"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(QueryError::RequestTimeout("t".into()).is_transient());
        assert!(QueryError::Throttled {
            message: "slow down".into(),
            retry_after: Some(Duration::from_millis(10)),
        }
        .is_transient());
        assert!(!QueryError::PartitionKeyRangeGone("1".into()).is_transient());
        assert!(!QueryError::bad_request("q").is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::malformed_continuation("not json");
        let display = format!("{}", err);
        assert!(display.contains("Malformed continuation token"));
        assert!(display.contains("not json"));
        assert_eq!(err.code(), "MALFORMED_CONTINUATION_TOKEN");
    }
}
