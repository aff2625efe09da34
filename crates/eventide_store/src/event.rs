//! Event types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A telemetry event waiting to be submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier; also the key of the event in the store.
    pub id: String,
    /// Type tag, e.g. `_session.start` or `checkout.completed`.
    pub event_type: String,
    /// Session the event was recorded in, if any.
    pub session_id: Option<String>,
    /// String attributes.
    pub attributes: BTreeMap<String, String>,
    /// Numeric metrics.
    pub metrics: BTreeMap<String, f64>,
    /// Creation time in milliseconds since the UNIX epoch.
    pub created_at_ms: u64,
}

impl Event {
    /// Creates an event with a random v4 id, stamped with the current time.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), event_type)
    }

    /// Creates an event with an explicit id.
    pub fn with_id(id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            session_id: None,
            attributes: BTreeMap::new(),
            metrics: BTreeMap::new(),
            created_at_ms: now_millis(),
        }
    }

    /// Sets the session id.
    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a metric.
    #[must_use]
    pub fn metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Overrides the creation timestamp.
    #[must_use]
    pub fn created_at(mut self, millis: u64) -> Self {
        self.created_at_ms = millis;
        self
    }
}

/// An event as held by the store, with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// The event itself.
    pub event: Event,
    /// Failed delivery attempts so far. Never decreases.
    pub retry_count: u32,
    /// Dirty events are never submitted again and wait to be purged.
    pub dirty: bool,
    /// Insertion order within the store.
    pub sequence: u64,
}

impl StoredEvent {
    /// Shorthand for `self.event.id`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.event.id
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
