//! Composite continuation tokens
//!
//! Wire format (JSON array, ascending by `range.min`, no overlaps):
//!
//! ```text
//! [{"range":{"min":"","max":"80"},"token":"5"},{"range":{"min":"80","max":"FF"},"token":null}]
//! ```
//!
//! Two older shapes are still accepted on input: a single composite
//! object, and a bare backend continuation which is taken to span the
//! full key space.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, QueryResult};
use crate::routing::Range;

/// Progress within one key range: the range plus the backend
/// continuation for it. `token == None` means "start of range".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeContinuationToken {
    pub range: Range<String>,
    pub token: Option<String>,
}

impl CompositeContinuationToken {
    /// Create a token for `range`
    pub fn new(range: Range<String>, token: Option<String>) -> Self {
        Self {
            range,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Token at the start of `range`
    pub fn fresh(range: Range<String>) -> Self {
        Self { range, token: None }
    }

    /// Parse a continuation header value.
    ///
    /// Fails with `MalformedContinuationToken` on invalid JSON, an empty
    /// array, or ranges that are unsorted, overlapping or inverted.
    pub fn parse_list(raw: &str) -> QueryResult<Vec<CompositeContinuationToken>> {
        let trimmed = raw.trim();
        let mut tokens: Vec<CompositeContinuationToken> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)
                .map_err(|e| QueryError::malformed_continuation(format!("{}: {}", e, raw)))?
        } else if trimmed.starts_with('{') {
            let single: CompositeContinuationToken = serde_json::from_str(trimmed)
                .map_err(|e| QueryError::malformed_continuation(format!("{}: {}", e, raw)))?;
            vec![single]
        } else {
            vec![CompositeContinuationToken::new(Range::full(), Some(raw.to_string()))]
        };

        if tokens.is_empty() {
            return Err(QueryError::malformed_continuation(format!(
                "empty composite token list: {}",
                raw
            )));
        }
        for token in tokens.iter_mut() {
            if token.token.as_deref() == Some("") {
                token.token = None;
            }
        }
        Self::validate_list(&tokens)?;
        Ok(tokens)
    }

    /// Serialize a token list for a continuation header
    pub fn serialize_list(tokens: &[CompositeContinuationToken]) -> QueryResult<String> {
        Self::validate_list(tokens)?;
        serde_json::to_string(tokens).map_err(|e| QueryError::Internal(e.to_string()))
    }

    /// Check the sort and overlap rules of a token list
    pub fn validate_list(tokens: &[CompositeContinuationToken]) -> QueryResult<()> {
        for token in tokens {
            if !token.range.is_valid() || token.range.is_empty() {
                return Err(QueryError::malformed_continuation(format!(
                    "invalid range {}",
                    token.range
                )));
            }
        }
        for pair in tokens.windows(2) {
            let (a, b) = (&pair[0].range, &pair[1].range);
            if Range::cmp_by_min(a, b) != Ordering::Less {
                return Err(QueryError::malformed_continuation(format!(
                    "ranges out of order: {} before {}",
                    a, b
                )));
            }
            if Range::overlaps(a, b) {
                return Err(QueryError::malformed_continuation(format!(
                    "ranges overlap: {} and {}",
                    a, b
                )));
            }
        }
        Ok(())
    }
}
