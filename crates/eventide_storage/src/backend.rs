//! The byte-store contract shared by every backend.

use crate::error::StorageResult;

/// A byte store that the event log is written into.
///
/// # Invariants
///
/// - `append` returns the offset the bytes were written at
/// - `read_at` returns exactly what was appended at that offset
/// - after `sync` returns, everything appended so far survives a crash
/// - `replace` either fully installs the new contents or leaves the old
///   contents untouched
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::ReadPastEnd`] when the range is not
    /// fully inside the store, or with an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it starts at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes down to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current size in bytes, which is also the next append offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    fn size(&self) -> StorageResult<u64>;

    /// Makes every appended byte, and the size itself, durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops everything after `new_size`.
    ///
    /// The event store uses this to cut off a torn trailing record found
    /// during replay.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size or the
    /// truncation itself fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically swaps the whole contents for `data`.
    ///
    /// Compaction writes the surviving records through this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be installed; the old
    /// contents are still intact in that case.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
