//! Observability: structured logging and run counters
//!
//! Observability is read-only. It never changes how a run executes, and a
//! failure to write a log line is ignored.
//!
//! ```ignore
//! use batchread::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::PartitionCompleted, &[("rows", "42")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Failure events are logged at ERROR, everything else at INFO.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a high-volume event at TRACE
pub fn trace_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::trace(event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::RunStarted);
        log_event(Event::RunComplete);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::PartitionFailed, &[("partition", "p1")]);
        trace_event_with_fields(Event::PartitionStarted, &[("partition", "p1")]);
    }
}
