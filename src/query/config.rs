//! Execution context configuration
//!
//! Fixed when the context is created. Loaded from JSON or built in code;
//! absent fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, QueryResult};

/// Settings of one execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Whether the caller will resume with continuations.
    ///
    /// Single-partition aggregates are only served when this is true.
    pub is_continuation_expected: bool,

    /// Allow a query to visit more than one partition
    pub enable_cross_partition_query: bool,

    /// Page size hint sent to the backend
    pub max_item_count: Option<u32>,

    /// Pin every request to one physical range
    pub partition_key_range_id: Option<String>,

    /// Send queries through the gateway instead of routing them here
    pub bypass_query_parsing: bool,

    /// Attempts allowed for timeouts, throttling and unavailability
    pub max_transient_retries: u32,

    pub initial_backoff_ms: u64,

    pub max_backoff_ms: u64,

    pub session_token: Option<String>,

    /// Continuation to resume from
    pub initial_continuation: Option<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            is_continuation_expected: true,
            enable_cross_partition_query: false,
            max_item_count: None,
            partition_key_range_id: None,
            bypass_query_parsing: false,
            max_transient_retries: 9,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            session_token: None,
            initial_continuation: None,
        }
    }
}

impl ExecutionConfig {
    /// Configuration for a cross-partition query
    pub fn cross_partition() -> Self {
        Self {
            enable_cross_partition_query: true,
            ..Self::default()
        }
    }

    pub fn with_max_item_count(mut self, max_item_count: u32) -> Self {
        self.max_item_count = Some(max_item_count);
        self
    }

    pub fn with_continuation(mut self, continuation: impl Into<String>) -> Self {
        self.initial_continuation = Some(continuation.into());
        self
    }

    /// Pin to one physical range
    pub fn pinned_to(mut self, range_id: impl Into<String>) -> Self {
        self.partition_key_range_id = Some(range_id.into());
        self
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> QueryResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| QueryError::bad_request(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueryResult<()> {
        if self.max_item_count == Some(0) {
            return Err(QueryError::bad_request("max_item_count must be positive"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(QueryError::bad_request(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        if matches!(self.partition_key_range_id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(QueryError::bad_request("partition_key_range_id must not be empty"));
        }
        Ok(())
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
