//! Batches drawn from the store.

use crate::event::StoredEvent;

/// An ordered snapshot of non-dirty events, oldest first.
///
/// A batch is a copy: later store mutations do not change it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    events: Vec<StoredEvent>,
}

impl Batch {
    pub(crate) fn new(events: Vec<StoredEvent>) -> Self {
        Self { events }
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The events, oldest first.
    #[must_use]
    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    /// Iterates over the events.
    pub fn iter(&self) -> std::slice::Iter<'_, StoredEvent> {
        self.events.iter()
    }

    /// Ids of the events, in batch order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.events.iter().map(StoredEvent::id).collect()
    }

    /// Looks up an event of this batch by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StoredEvent> {
        self.events.iter().find(|e| e.id() == id)
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a StoredEvent;
    type IntoIter = std::slice::Iter<'a, StoredEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
