//! Test utilities for asserting on emitted log events.
//!
//! Provides an `EventCaptureLayer` that records the level, message and
//! fields of every tracing event emitted while its guard is held.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// A recorded event
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// Shared storage for captured events.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<CapturedEvent>>>);

impl EventLog {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().clone()
    }

    /// Events at `level` whose message is exactly `message`
    pub fn find(&self, level: Level, message: &str) -> Vec<CapturedEvent> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.level == level && e.message == message)
            .cloned()
            .collect()
    }

    pub fn count_at(&self, level: Level) -> usize {
        self.0.lock().iter().filter(|e| e.level == level).count()
    }
}

struct EventCaptureLayer {
    log: EventLog,
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for EventCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.log.0.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Capture events on the current thread until the guard is dropped.
pub fn capture_events() -> (EventLog, tracing::subscriber::DefaultGuard) {
    let log = EventLog::default();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer { log: log.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (log, guard)
}
