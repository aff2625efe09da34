//! Error types for the event store.

use eventide_storage::StorageError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the event store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(String),

    /// A record payload could not be deserialized.
    #[error("failed to decode record at offset {offset}: {message}")]
    Decode {
        /// Offset of the record in the log.
        offset: u64,
        /// Decoder message.
        message: String,
    },

    /// The log is structurally broken before its last record.
    #[error("event log corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Offset of the broken record.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A record checksum did not match.
    #[error("checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Offset of the record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// The store is over its byte budget. The write that triggered this
    /// was persisted; the caller should prune.
    #[error("event store over capacity: {live_bytes} bytes live, limit {limit}")]
    CapacityExceeded {
        /// Live bytes after the write.
        live_bytes: u64,
        /// Configured limit.
        limit: u64,
    },

    /// An event with the same id is already stored.
    #[error("event {0} is already stored")]
    DuplicateEvent(String),
}

impl StoreError {
    /// Returns true for [`StoreError::CapacityExceeded`].
    #[must_use]
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    pub(crate) fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}
