//! User-facing reconcile events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEvent {
    pub kind: &'static str,
    pub name: String,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Sink for reconcile events.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: RecordedEvent);

    fn normal(&self, kind: &'static str, name: &str, reason: &str, message: String) {
        self.record(RecordedEvent {
            kind,
            name: name.to_string(),
            event_type: EventType::Normal,
            reason: reason.to_string(),
            message,
            timestamp: Utc::now(),
        });
    }

    fn warning(&self, kind: &'static str, name: &str, reason: &str, message: String) {
        self.record(RecordedEvent {
            kind,
            name: name.to_string(),
            event_type: EventType::Warning,
            reason: reason.to_string(),
            message,
            timestamp: Utc::now(),
        });
    }
}

/// Emits every event as a tracing event.
#[derive(Debug, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, event: RecordedEvent) {
        match event.event_type {
            EventType::Normal => info!(
                kind = event.kind,
                name = %event.name,
                reason = %event.reason,
                "{}",
                event.message
            ),
            EventType::Warning => warn!(
                kind = event.kind,
                name = %event.name,
                reason = %event.reason,
                "{}",
                event.message
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct NoopRecorder;

impl EventRecorder for NoopRecorder {
    fn record(&self, _event: RecordedEvent) {}
}
