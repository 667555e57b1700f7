//! Metrics for the room server
//!
//! Metrics go through the `metrics` facade; installing a recorder or an
//! exporter is left to the embedding process.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const PEEK_ACCEPTED: &str = "roomserver.peek.accepted";
pub const PEEK_REJECTED: &str = "roomserver.peek.rejected";
pub const PEEK_DURATION_MS: &str = "roomserver.peek.duration_ms";
pub const DIRECTORY_LOOKUPS: &str = "roomserver.directory.lookups";
pub const OUTPUT_EVENTS_WRITTEN: &str = "roomserver.output.events_written";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(PEEK_ACCEPTED, "Peeks accepted and recorded");
    describe_counter!(PEEK_REJECTED, "Peeks rejected, labelled by error code");
    describe_histogram!(PEEK_DURATION_MS, "Peek call duration in milliseconds");
    describe_counter!(DIRECTORY_LOOKUPS, "Alias lookups sent to remote directories, labelled by outcome");
    describe_counter!(OUTPUT_EVENTS_WRITTEN, "Events appended to the output stream");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a counter metric with a single label
pub fn record_labeled_counter(name: &'static str, label: &'static str, value: &'static str) {
    counter!(name, label => value).increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}
