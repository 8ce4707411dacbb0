//! Observability subsystem
//!
//! Structured JSON logging and typed lifecycle events. Observability is
//! read-only: logging never changes control-plane behavior and never fails
//! an operation.

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

fn severity_for(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    match severity_for(event) {
        severity @ (Severity::Error | Severity::Fatal) => {
            Logger::log_stderr(severity, event.as_str(), fields)
        }
        severity => Logger::log(severity, event.as_str(), fields),
    }
}

/// Log an event scoped to one destination.
pub fn log_destination_event(event: Event, destination: &str, fields: &[(&str, &str)]) {
    let mut all_fields: Vec<(&str, &str)> = Vec::with_capacity(fields.len() + 1);
    all_fields.push(("destination", destination));
    all_fields.extend_from_slice(fields);
    log_event_with_fields(event, &all_fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_for_event_classes() {
        assert_eq!(severity_for(Event::StartupAborted), Severity::Fatal);
        assert_eq!(severity_for(Event::ActionFailed), Severity::Error);
        assert_eq!(severity_for(Event::ElectionActive), Severity::Info);
    }

    #[test]
    fn test_log_destination_event() {
        log_destination_event(Event::ElectionStandby, "orders", &[("holder", "10.0.0.2:11111")]);
    }
}
