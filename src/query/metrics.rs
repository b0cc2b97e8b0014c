//! Per-page fetch diagnostics
//!
//! Every returned page carries the fetch ranges recorded since the last
//! successful page, keyed by the partition identifier that served it.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One attempt against one partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchExecutionRange {
    pub partition_id: String,
    pub activity_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub number_of_documents: u64,
    pub retry_count: i64,
}

/// Collects fetch ranges between successful pages
#[derive(Debug, Default)]
pub struct FetchExecutionRangeAccumulator {
    started_at: Option<DateTime<Utc>>,
    ranges: Vec<FetchExecutionRange>,
}

impl FetchExecutionRangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of an attempt
    pub fn begin_fetch_range(&mut self) {
        self.started_at = Some(Utc::now());
    }

    /// Record the attempt started by the last `begin_fetch_range`
    pub fn end_fetch_range(
        &mut self,
        partition_id: &str,
        activity_id: Option<&str>,
        number_of_documents: u64,
        retry_count: i64,
    ) {
        let end_time = Utc::now();
        let start_time = self.started_at.take().unwrap_or(end_time);
        self.ranges.push(FetchExecutionRange {
            partition_id: partition_id.to_string(),
            activity_id: activity_id.map(str::to_string),
            start_time,
            end_time,
            number_of_documents,
            retry_count,
        });
    }

    /// Drain the recorded ranges
    pub fn get_execution_ranges(&mut self) -> Vec<FetchExecutionRange> {
        std::mem::take(&mut self.ranges)
    }
}

/// Scheduling time of one context
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SchedulingTimeSpan {
    /// First start to last stop
    pub turnaround_time: Duration,
    /// First start to first stop
    pub response_time: Duration,
    /// Time spent running
    pub run_time: Duration,
    pub num_preemptions: u64,
}

/// Tracks run time of a context across pages
#[derive(Debug, Default)]
pub struct SchedulingStopwatch {
    first_start: Option<Instant>,
    running_since: Option<Instant>,
    response_time: Option<Duration>,
    run_time: Duration,
    turnaround_time: Duration,
    num_preemptions: u64,
}

impl SchedulingStopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        if self.running_since.is_some() {
            return;
        }
        let now = Instant::now();
        self.first_start.get_or_insert(now);
        self.running_since = Some(now);
    }

    pub fn stop(&mut self) {
        let since = match self.running_since.take() {
            Some(since) => since,
            None => return,
        };
        let now = Instant::now();
        self.run_time += now.duration_since(since);
        if let Some(first) = self.first_start {
            let elapsed = now.duration_since(first);
            self.response_time.get_or_insert(elapsed);
            self.turnaround_time = elapsed;
        }
        self.num_preemptions += 1;
    }

    pub fn elapsed(&self) -> SchedulingTimeSpan {
        SchedulingTimeSpan {
            turnaround_time: self.turnaround_time,
            response_time: self.response_time.unwrap_or_default(),
            run_time: self.run_time,
            num_preemptions: self.num_preemptions,
        }
    }
}

/// Client-side diagnostics attached to a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientSideMetrics {
    pub retries: i64,
    pub request_charge: f64,
    pub fetch_execution_ranges: Vec<FetchExecutionRange>,
    /// Present on the last page of a partition
    pub partition_scheduling_time_spans: Vec<(String, SchedulingTimeSpan)>,
    /// Raw backend query metrics header
    pub backend_metrics: String,
}
