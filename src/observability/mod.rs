//! Observability for the routing core
//!
//! - Structured logging (JSON lines)
//! - Typed routing events
//! - Lock-free counters
//!
//! Observability is read-only: it never changes routing decisions.

mod events;
mod logger;
mod metrics;

pub use events::RoutingEvent;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, RoutingMetrics};

/// Log a routing event at its default severity
pub fn log_event(event: RoutingEvent, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
