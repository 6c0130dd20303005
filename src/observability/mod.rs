//! Observability for index operations
//!
//! - Structured JSON logging with a global minimum severity
//! - Typed lifecycle events
//! - Atomic counters
//!
//! # Principles
//!
//! 1. Observability is read-only: it never changes an index result
//! 2. Synchronous, no background threads
//! 3. Deterministic output (sorted fields)
//!
//! # Usage
//!
//! ```ignore
//! use aerobitmap::observability::{log_event, Event, MetricsRegistry};
//!
//! log_event(Event::AppendMerged, &[("column", "a"), ("rows", "12")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_indexes_built();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Logs `event` at its own severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
