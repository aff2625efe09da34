//! # Eventide Store
//!
//! A durable, size-bounded FIFO of telemetry events.
//!
//! Every event carries delivery bookkeeping next to its payload: a retry
//! count that only ever grows and a dirty flag that takes the event out of
//! circulation until it is purged. The store is a replayed append-only log
//! of CBOR records on top of an [`eventide_storage::StorageBackend`].
//!
//! ## Guarantees
//!
//! - A mutation is on disk before the call returns (unless
//!   [`StoreConfig::sync_on_write`] is off, in which case it is flushed)
//! - Batches are in insertion order and never contain dirty events
//! - A crash mid-write loses at most the record being written
//! - Compaction never changes what the store holds
//!
//! ## Example
//!
//! ```rust
//! use eventide_storage::InMemoryBackend;
//! use eventide_store::{Event, EventStore, StoreConfig};
//!
//! let mut store = EventStore::open(InMemoryBackend::new(), StoreConfig::default()).unwrap();
//! store.save(Event::with_id("a", "app.open")).unwrap();
//! store.save(Event::with_id("b", "app.close")).unwrap();
//! store.mark_dirty("a").unwrap();
//!
//! let batch = store.get_batch(100);
//! assert_eq!(batch.ids(), ["b"]);
//!
//! assert_eq!(store.remove_dirty_and_exhausted(3).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod error;
mod event;
mod record;
mod store;

pub use batch::Batch;
pub use config::{StoreConfig, DEFAULT_BYTE_LIMIT};
pub use error::{StoreError, StoreResult};
pub use event::{Event, StoredEvent};
pub use record::{
    compute_crc32, scan, LogRecord, LogScan, RecordKind, ScannedRecord, CRC_SIZE, HEADER_SIZE,
    RECORD_MAGIC,
};
pub use store::{CompactionReport, EventStore, StoreStats};
