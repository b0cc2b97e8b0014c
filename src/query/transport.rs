//! Transport collaborator

use tokio_util::sync::CancellationToken;

use super::request::FeedRequest;
use super::response::FeedResponse;
use crate::errors::QueryResult;
use crate::routing::BoxFuture;

/// Sends one request and returns one page.
///
/// Implementations surface wire failures with `QueryError::from_status`
/// and must honour `cancel`.
pub trait Transport: Send + Sync {
    fn execute_request<'a>(
        &'a self,
        request: &'a FeedRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, QueryResult<FeedResponse>>;
}
