//! Observability sink and in-process event bus.
//!
//! Every pipeline stage receives an [`EventSink`] at construction time and
//! publishes stage boundaries and per-item failures through it. The sink is
//! purely an observer: publishing never fails and never blocks on a
//! subscriber, and a bus with zero subscribers simply drops events.
//!
//! # Example
//!
//! ```
//! use dupetree::events::{EventBus, EventLevel, EventSink, MemorySink};
//! use std::sync::Arc;
//!
//! let memory = Arc::new(MemorySink::new());
//! let bus = EventBus::new();
//! bus.add_subscriber(memory.clone());
//!
//! bus.publish(EventLevel::Info, "collector started");
//! assert_eq!(memory.messages(), vec!["collector started".to_string()]);
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    /// Fine-grained progress (group counts, per-pass details).
    Debug,
    /// Stage boundaries.
    Info,
    /// A file or directory was skipped.
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// A single published event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Severity.
    pub level: EventLevel,
    /// Human-readable message.
    pub message: String,
    /// Time the event was published.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for an info event.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, message)
    }

    /// Shorthand for a debug event.
    #[must_use]
    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Debug, message)
    }

    /// Shorthand for an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, message)
    }
}

/// Destination for pipeline events.
pub trait EventSink: Send + Sync {
    /// Publish a message at the given level.
    fn publish(&self, level: EventLevel, message: &str);

    /// Publish at info level.
    fn info(&self, message: &str) {
        self.publish(EventLevel::Info, message);
    }

    /// Publish at debug level.
    fn debug(&self, message: &str) {
        self.publish(EventLevel::Debug, message);
    }

    /// Publish at error level.
    fn error(&self, message: &str) {
        self.publish(EventLevel::Error, message);
    }
}

/// Receiver registered on an [`EventBus`].
pub trait Subscriber: Send + Sync {
    /// Handle one event. Must return promptly.
    fn handle_event(&self, event: &Event);

    /// Whether this subscriber wants events of `level`.
    fn is_interested_in(&self, _level: EventLevel) -> bool {
        true
    }
}

/// In-process fan-out of events to registered subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.
    pub fn add_subscriber(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver an already-built event.
    pub fn publish_event(&self, event: &Event) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for subscriber in subscribers.iter() {
            if subscriber.is_interested_in(event.level) {
                subscriber.handle_event(event);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventSink for EventBus {
    fn publish(&self, level: EventLevel, message: &str) {
        if self.subscriber_count() == 0 {
            return;
        }
        self.publish_event(&Event::new(level, message));
    }
}

/// Sink that forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, level: EventLevel, message: &str) {
        match level {
            EventLevel::Debug => log::debug!("{}", message),
            EventLevel::Info => log::info!("{}", message),
            EventLevel::Error => log::warn!("{}", message),
        }
    }
}

impl Subscriber for LogSink {
    fn handle_event(&self, event: &Event) {
        self.publish(event.level, &event.message);
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _level: EventLevel, _message: &str) {}
}

/// Sink that keeps every event in memory.
///
/// Useful for tests and for callers that want the list of skipped items
/// after a scan.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages of all recorded events, in publish order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }

    /// Number of recorded events at `level`.
    #[must_use]
    pub fn count(&self, level: EventLevel) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.level == level)
            .count()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, level: EventLevel, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event::new(level, message));
    }
}

impl Subscriber for MemorySink {
    fn handle_event(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Default sink used when none is injected.
#[must_use]
pub fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(LogSink)
}
