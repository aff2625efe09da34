//! Volatile backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A backend that keeps the log in a `Vec<u8>`.
///
/// Nothing survives the process. Tests use [`InMemoryBackend::with_data`]
/// and [`InMemoryBackend::data`] to hand a log from one store instance to
/// the next and to corrupt it on purpose.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the current contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StorageResult<()> {
        *self.data.write() = bytes.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn append_offsets_are_contiguous() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"de").unwrap(), 3);
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.read_at(1, 3).unwrap(), b"bcd");
    }

    #[test]
    fn read_outside_store_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"abc").unwrap();

        assert!(matches!(
            backend.read_at(2, 5),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
        assert!(matches!(
            backend.read_at(10, 0),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn truncate_cuts_tail() {
        let mut backend = InMemoryBackend::with_data(b"record+torn".to_vec());
        backend.truncate(6).unwrap();
        assert_eq!(backend.data(), b"record");

        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::InvalidTruncate { requested: 100, size: 6 })
        ));
    }

    #[test]
    fn replace_swaps_contents() {
        let mut backend = InMemoryBackend::with_data(vec![1; 64]);
        backend.replace(&[2, 3]).unwrap();
        assert_eq!(backend.data(), vec![2, 3]);
        assert_eq!(backend.append(&[4]).unwrap(), 2);
    }

    proptest! {
        #[test]
        fn appended_chunks_read_back(chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..32), 1..16)) {
            let mut backend = InMemoryBackend::new();
            let offsets: Vec<u64> = chunks
                .iter()
                .map(|chunk| backend.append(chunk).unwrap())
                .collect();

            for (offset, chunk) in offsets.iter().zip(&chunks) {
                prop_assert_eq!(&backend.read_at(*offset, chunk.len()).unwrap(), chunk);
            }
        }
    }
}
