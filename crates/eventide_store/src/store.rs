//! The durable event store.

use crate::batch::Batch;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::event::{Event, StoredEvent};
use crate::record::{self, LogRecord};
use eventide_storage::{StorageBackend, StorageResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::{debug, info, warn};

/// Summary of what a store currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Stored events, dirty ones included.
    pub events: usize,
    /// Events marked dirty and waiting to be purged.
    pub dirty: usize,
    /// Highest retry count of any stored event.
    pub max_retry_count: u32,
    /// Encoded size of the current snapshot of every event.
    pub live_bytes: u64,
    /// Physical size of the log.
    pub log_bytes: u64,
    /// Configured live-byte budget.
    pub byte_limit: u64,
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// Log size before.
    pub bytes_before: u64,
    /// Log size after.
    pub bytes_after: u64,
    /// Events written to the new log.
    pub events: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    stored: StoredEvent,
    encoded_len: u64,
}

/// A durable FIFO of events with retry and dirty bookkeeping.
///
/// State lives in memory (an id index plus an insertion-order index) and
/// every mutation is appended to the backend as a [`LogRecord`] before the
/// call returns. Opening a store replays the log.
///
/// Mutations on ids that are not stored are no-ops and report `false`.
///
/// # Example
///
/// ```rust
/// use eventide_storage::InMemoryBackend;
/// use eventide_store::{Event, EventStore, StoreConfig};
///
/// let mut store = EventStore::open(InMemoryBackend::new(), StoreConfig::default()).unwrap();
/// store.save(Event::with_id("e-1", "app.start")).unwrap();
/// store.increment_retry("e-1").unwrap();
///
/// let batch = store.get_batch(100);
/// assert_eq!(batch.events()[0].retry_count, 1);
/// ```
pub struct EventStore<B: StorageBackend> {
    backend: B,
    config: StoreConfig,
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    next_sequence: u64,
    live_bytes: u64,
}

impl<B: StorageBackend> EventStore<B> {
    /// Opens a store on `backend`, replaying any existing log.
    ///
    /// A torn trailing record is cut off.
    ///
    /// # Errors
    ///
    /// Fails if the log is corrupted before its last record or the backend
    /// cannot be read or truncated.
    pub fn open(mut backend: B, config: StoreConfig) -> StoreResult<Self> {
        let scan = record::scan(&backend)?;
        if scan.is_torn() {
            warn!(
                valid_len = scan.valid_len,
                total_len = scan.total_len,
                "Discarding torn record at end of event log"
            );
            backend.truncate(scan.valid_len)?;
        }

        let mut store = Self {
            backend,
            config,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: 0,
            live_bytes: 0,
        };
        let replayed = scan.records.len();
        for scanned in scan.records {
            store.apply(scanned.record, scanned.len);
        }

        debug!(
            records = replayed,
            events = store.entries.len(),
            live_bytes = store.live_bytes,
            "Replayed event log"
        );
        store.maybe_compact();
        Ok(store)
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of stored events, dirty ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an event by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StoredEvent> {
        self.entries.get(id).map(|e| &e.stored)
    }

    /// Iterates over all stored events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredEvent> + '_ {
        self.order
            .values()
            .filter_map(|id| self.entries.get(id).map(|e| &e.stored))
    }

    /// Encoded size of every live event snapshot.
    #[must_use]
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Appends a new event.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateEvent`] if the id is already stored; nothing
    ///   is written.
    /// - [`StoreError::CapacityExceeded`] if the store is over its byte
    ///   limit after the insertion. The event **is** persisted; the caller
    ///   is expected to [`prune_to_limit`](Self::prune_to_limit).
    pub fn save(&mut self, event: Event) -> StoreResult<()> {
        if self.entries.contains_key(&event.id) {
            return Err(StoreError::DuplicateEvent(event.id));
        }

        let stored = StoredEvent {
            event,
            retry_count: 0,
            dirty: false,
            sequence: self.next_sequence,
        };
        self.persist(vec![LogRecord::Put(stored)])?;

        if self.live_bytes > self.config.byte_limit {
            return Err(StoreError::CapacityExceeded {
                live_bytes: self.live_bytes,
                limit: self.config.byte_limit,
            });
        }
        Ok(())
    }

    /// Returns up to `limit` non-dirty events, oldest first.
    #[must_use]
    pub fn get_batch(&self, limit: usize) -> Batch {
        self.get_batch_after(None, limit)
    }

    /// Like [`get_batch`](Self::get_batch), but only considers events whose
    /// sequence number is greater than `after`.
    #[must_use]
    pub fn get_batch_after(&self, after: Option<u64>, limit: usize) -> Batch {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let events = self
            .order
            .range((lower, Bound::Unbounded))
            .filter_map(|(_, id)| self.entries.get(id).map(|e| &e.stored))
            .filter(|stored| !stored.dirty)
            .take(limit)
            .cloned()
            .collect();
        Batch::new(events)
    }

    /// Deletes an event. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the tombstone cannot be persisted.
    pub fn delete_event(&mut self, id: &str) -> StoreResult<bool> {
        if !self.entries.contains_key(id) {
            return Ok(false);
        }
        self.persist(vec![LogRecord::Remove(id.to_string())])?;
        Ok(true)
    }

    /// Marks an event dirty so it is never submitted again. Returns whether
    /// it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be persisted.
    pub fn mark_dirty(&mut self, id: &str) -> StoreResult<bool> {
        self.update(id, |stored| stored.dirty = true)
    }

    /// Adds one to an event's retry count. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be persisted.
    pub fn increment_retry(&mut self, id: &str) -> StoreResult<bool> {
        self.update(id, |stored| {
            stored.retry_count = stored.retry_count.saturating_add(1);
        })
    }

    /// Merges `attributes` into every event of `event_type` recorded in
    /// `session_id`. Returns how many events were updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the updates cannot be persisted.
    pub fn update_attributes(
        &mut self,
        event_type: &str,
        session_id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> StoreResult<usize> {
        let records: Vec<LogRecord> = self
            .iter()
            .filter(|s| {
                s.event.event_type == event_type && s.event.session_id.as_deref() == Some(session_id)
            })
            .map(|s| {
                let mut updated = s.clone();
                updated
                    .event
                    .attributes
                    .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
                LogRecord::Put(updated)
            })
            .collect();

        let count = records.len();
        self.persist(records)?;
        Ok(count)
    }

    /// Removes every dirty event and every event whose retry count reached
    /// `max_retries`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the tombstones cannot be persisted.
    pub fn remove_dirty_and_exhausted(&mut self, max_retries: u32) -> StoreResult<usize> {
        self.remove_where(|s| s.dirty || s.retry_count >= max_retries)
    }

    /// Removes every dirty event. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the tombstones cannot be persisted.
    pub fn remove_dirty(&mut self) -> StoreResult<usize> {
        self.remove_where(|s| s.dirty)
    }

    /// Evicts events until the live bytes fit the byte limit: dirty events
    /// first, then the oldest ones. Returns how many were evicted.
    ///
    /// # Errors
    ///
    /// Returns an error if the tombstones cannot be persisted.
    pub fn prune_to_limit(&mut self) -> StoreResult<usize> {
        let limit = self.config.byte_limit;
        if self.live_bytes <= limit {
            return Ok(0);
        }

        let mut remaining = self.live_bytes;
        let mut victims = Vec::new();
        let dirty_first = self
            .order
            .values()
            .filter(|id| self.entries[*id].stored.dirty)
            .chain(
                self.order
                    .values()
                    .filter(|id| !self.entries[*id].stored.dirty),
            );
        for id in dirty_first {
            if remaining <= limit {
                break;
            }
            remaining -= self.entries[id].encoded_len;
            victims.push(LogRecord::Remove(id.clone()));
        }

        let evicted = victims.len();
        self.persist(victims)?;
        warn!(
            evicted,
            live_bytes = self.live_bytes,
            limit,
            "Pruned event store to its byte limit"
        );
        Ok(evicted)
    }

    /// Rewrites the log so it holds exactly one record per live event.
    ///
    /// # Errors
    ///
    /// Returns an error if the new log cannot be encoded or installed; the
    /// old log stays in place in that case.
    pub fn compact(&mut self) -> StoreResult<CompactionReport> {
        let bytes_before = self.backend.size()?;

        let mut log = Vec::with_capacity(self.live_bytes as usize);
        for stored in self.iter() {
            log.extend(LogRecord::Put(stored.clone()).encode()?);
        }
        self.backend.replace(&log)?;

        let report = CompactionReport {
            bytes_before,
            bytes_after: log.len() as u64,
            events: self.entries.len(),
        };
        info!(
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            events = report.events,
            "Compacted event log"
        );
        Ok(report)
    }

    /// Summary of the store's contents.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            events: self.entries.len(),
            dirty: self.entries.values().filter(|e| e.stored.dirty).count(),
            max_retry_count: self
                .entries
                .values()
                .map(|e| e.stored.retry_count)
                .max()
                .unwrap_or(0),
            live_bytes: self.live_bytes,
            log_bytes: self.backend.size().unwrap_or(0),
            byte_limit: self.config.byte_limit,
        }
    }

    fn update(&mut self, id: &str, change: impl FnOnce(&mut StoredEvent)) -> StoreResult<bool> {
        let Some(entry) = self.entries.get(id) else {
            return Ok(false);
        };
        let mut updated = entry.stored.clone();
        change(&mut updated);
        self.persist(vec![LogRecord::Put(updated)])?;
        Ok(true)
    }

    fn remove_where(&mut self, doomed: impl Fn(&StoredEvent) -> bool) -> StoreResult<usize> {
        let records: Vec<LogRecord> = self
            .iter()
            .filter(|&s| doomed(s))
            .map(|s| LogRecord::Remove(s.id().to_string()))
            .collect();
        let removed = records.len();
        self.persist(records)?;
        Ok(removed)
    }

    /// Writes `records` as one append, then applies them in memory.
    fn persist(&mut self, records: Vec<LogRecord>) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        let mut lens = Vec::with_capacity(records.len());
        for record in &records {
            let encoded = record.encode()?;
            lens.push(encoded.len() as u64);
            buf.extend(encoded);
        }

        let size_before = self.backend.size()?;
        if let Err(e) = self.write_through(&buf) {
            self.roll_back(size_before);
            return Err(e.into());
        }

        for (record, len) in records.into_iter().zip(lens) {
            self.apply(record, len);
        }
        self.maybe_compact();
        Ok(())
    }

    fn write_through(&mut self, buf: &[u8]) -> StorageResult<()> {
        self.backend.append(buf)?;
        if self.config.sync_on_write {
            self.backend.sync()
        } else {
            self.backend.flush()
        }
    }

    /// Cuts off whatever a failed write left behind.
    fn roll_back(&mut self, size: u64) {
        let current = match self.backend.size() {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Cannot read log size after failed write");
                return;
            }
        };
        if current <= size {
            return;
        }
        match self.backend.truncate(size) {
            Ok(()) => debug!(size, dropped = current - size, "Rolled back partial write"),
            Err(e) => warn!(size, error = %e, "Cannot roll back partial write"),
        }
    }

    fn apply(&mut self, record: LogRecord, encoded_len: u64) {
        match record {
            LogRecord::Put(stored) => {
                if let Some(previous) = self.entries.remove(stored.id()) {
                    self.order.remove(&previous.stored.sequence);
                    self.live_bytes -= previous.encoded_len;
                }
                self.next_sequence = self.next_sequence.max(stored.sequence + 1);
                self.order.insert(stored.sequence, stored.id().to_string());
                self.live_bytes += encoded_len;
                self.entries.insert(
                    stored.id().to_string(),
                    Entry {
                        stored,
                        encoded_len,
                    },
                );
            }
            LogRecord::Remove(id) => {
                if let Some(previous) = self.entries.remove(&id) {
                    self.order.remove(&previous.stored.sequence);
                    self.live_bytes -= previous.encoded_len;
                }
            }
        }
    }

    fn maybe_compact(&mut self) {
        let log_bytes = match self.backend.size() {
            Ok(size) => size,
            Err(_) => return,
        };
        if !self.config.wants_compaction(log_bytes, self.live_bytes) {
            return;
        }
        if let Err(e) = self.compact() {
            warn!(error = %e, "Automatic compaction failed");
        }
    }
}

impl<B: StorageBackend + std::fmt::Debug> std::fmt::Debug for EventStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("backend", &self.backend)
            .field("events", &self.entries.len())
            .field("live_bytes", &self.live_bytes)
            .finish()
    }
}
