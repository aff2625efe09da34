//! # Eventide Storage
//!
//! Byte-level storage for the Eventide event store.
//!
//! A backend is an **opaque, append-oriented byte store**. It knows nothing
//! about event records, framing or checksums; `eventide_store` owns the log
//! format and replays it on open.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - ephemeral storage for tests and throwaway queues
//! - [`FileBackend`] - a single locked file on disk
//!
//! ## Example
//!
//! ```rust
//! use eventide_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"queued").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"queued");
//!
//! backend.replace(b"compacted").unwrap();
//! assert_eq!(backend.size().unwrap(), 9);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
