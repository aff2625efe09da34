//! Which subsystem produced an event.

use eventide_store::Event;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

const PUSH_NOTIFICATION_MARKERS: [&str; 3] = [
    ".opened_notification",
    ".received_foreground",
    ".received_background",
];

/// Origin of an event, reported alongside each submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Application analytics.
    Analytics,
    /// Push notification interactions.
    PushNotifications,
}

impl EventSource {
    /// Classifies an event type.
    pub fn for_event_type(event_type: &str) -> Self {
        if PUSH_NOTIFICATION_MARKERS
            .iter()
            .any(|marker| event_type.contains(marker))
        {
            Self::PushNotifications
        } else {
            Self::Analytics
        }
    }

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analytics => "analytics",
            Self::PushNotifications => "push_notifications",
        }
    }

    /// Distinct sources of `events`.
    pub fn collect<'a>(events: impl IntoIterator<Item = &'a Event>) -> BTreeSet<Self> {
        events
            .into_iter()
            .map(|e| Self::for_event_type(&e.event_type))
            .collect()
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
