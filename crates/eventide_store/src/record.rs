//! Log record framing.
//!
//! Every mutation of the store is appended as one framed record:
//!
//! ```text
//! | magic "EVTQ" (4) | kind (1) | payload_len (4, LE) | CBOR payload | CRC32 (4, LE) |
//! ```
//!
//! The CRC covers header and payload. A `Put` carries the full
//! [`StoredEvent`] snapshot and supersedes any earlier snapshot of the same
//! id; a `Remove` carries only the id.

use crate::error::{StoreError, StoreResult};
use crate::event::StoredEvent;
use eventide_storage::StorageBackend;

/// Magic bytes opening every record.
pub const RECORD_MAGIC: [u8; 4] = *b"EVTQ";

/// magic (4) + kind (1) + payload_len (4)
pub const HEADER_SIZE: usize = 9;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Discriminant stored in the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Full snapshot of an event.
    Put,
    /// Tombstone.
    Remove,
}

impl RecordKind {
    /// Header byte for this kind.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Put => 1,
            Self::Remove => 2,
        }
    }

    /// Parses a header byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Put),
            2 => Some(Self::Remove),
            _ => None,
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// Insert or overwrite an event.
    Put(StoredEvent),
    /// Delete the event with this id.
    Remove(String),
}

impl LogRecord {
    /// Kind of this record.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Put(_) => RecordKind::Put,
            Self::Remove(_) => RecordKind::Remove,
        }
    }

    /// Id of the event the record applies to.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::Put(stored) => stored.id(),
            Self::Remove(id) => id,
        }
    }

    /// Encodes the record into its framed form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encode`] if CBOR serialization fails.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        let written = match self {
            Self::Put(stored) => ciborium::ser::into_writer(stored, &mut payload),
            Self::Remove(id) => ciborium::ser::into_writer(id, &mut payload),
        };
        written.map_err(|e| StoreError::Encode(e.to_string()))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&RECORD_MAGIC);
        buf.push(self.kind().as_byte());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    fn decode_payload(kind: RecordKind, payload: &[u8], offset: u64) -> StoreResult<Self> {
        let decode_err = |e: String| StoreError::Decode { offset, message: e };
        match kind {
            RecordKind::Put => ciborium::de::from_reader(payload)
                .map(Self::Put)
                .map_err(|e| decode_err(e.to_string())),
            RecordKind::Remove => ciborium::de::from_reader(payload)
                .map(Self::Remove)
                .map_err(|e| decode_err(e.to_string())),
        }
    }
}

/// A record found while scanning the log.
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    /// Offset of the record.
    pub offset: u64,
    /// Framed length, header and CRC included.
    pub len: u64,
    /// The record.
    pub record: LogRecord,
}

/// Result of scanning a whole log.
#[derive(Debug, Clone)]
pub struct LogScan {
    /// Complete records in log order.
    pub records: Vec<ScannedRecord>,
    /// Bytes covered by complete records.
    pub valid_len: u64,
    /// Physical size of the log.
    pub total_len: u64,
}

impl LogScan {
    /// Whether the log ends in an incomplete record.
    #[must_use]
    pub fn is_torn(&self) -> bool {
        self.valid_len < self.total_len
    }
}

/// Reads and validates every record in `backend`.
///
/// A record that is cut short at the end of the log, or the very last
/// record failing its checksum, is treated as a torn write and reported via
/// [`LogScan::is_torn`]. Damage anywhere before the last record is an error.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`], [`StoreError::ChecksumMismatch`] or
/// [`StoreError::Decode`] for damaged records, or a storage error.
pub fn scan(backend: &dyn StorageBackend) -> StoreResult<LogScan> {
    let total_len = backend.size()?;
    let data = backend.read_at(0, total_len as usize)?;

    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < HEADER_SIZE {
            break;
        }

        let header = &data[offset..offset + HEADER_SIZE];
        if header[0..4] != RECORD_MAGIC {
            return Err(StoreError::corrupted(offset as u64, "invalid magic"));
        }
        let kind = RecordKind::from_byte(header[4]).ok_or_else(|| {
            StoreError::corrupted(offset as u64, format!("unknown record kind {}", header[4]))
        })?;
        let payload_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;

        let record_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining < record_len {
            if let Some(next) = next_valid_record(&data, offset + 1) {
                return Err(StoreError::corrupted(
                    offset as u64,
                    format!(
                        "record length {payload_len} overruns the log, valid record follows at {next}"
                    ),
                ));
            }
            break;
        }

        let end = offset + record_len;
        let stored_crc = u32::from_le_bytes([
            data[end - 4],
            data[end - 3],
            data[end - 2],
            data[end - 1],
        ]);
        let actual_crc = compute_crc32(&data[offset..end - CRC_SIZE]);
        if stored_crc != actual_crc {
            if end == data.len() {
                break;
            }
            return Err(StoreError::ChecksumMismatch {
                offset: offset as u64,
                expected: stored_crc,
                actual: actual_crc,
            });
        }

        let payload = &data[offset + HEADER_SIZE..end - CRC_SIZE];
        let record = LogRecord::decode_payload(kind, payload, offset as u64)?;
        records.push(ScannedRecord {
            offset: offset as u64,
            len: record_len as u64,
            record,
        });
        offset = end;
    }

    Ok(LogScan {
        records,
        valid_len: offset as u64,
        total_len,
    })
}

/// Offset of the first complete, checksum-valid record at or after `from`.
fn next_valid_record(data: &[u8], from: usize) -> Option<usize> {
    let mut start = from;
    while start + HEADER_SIZE + CRC_SIZE <= data.len() {
        let found = data[start..]
            .windows(RECORD_MAGIC.len())
            .position(|w| w == RECORD_MAGIC)?;
        let at = start + found;
        if at + HEADER_SIZE + CRC_SIZE > data.len() {
            return None;
        }
        if RecordKind::from_byte(data[at + 4]).is_some() {
            let payload_len =
                u32::from_le_bytes([data[at + 5], data[at + 6], data[at + 7], data[at + 8]])
                    as usize;
            let end = at + HEADER_SIZE + payload_len + CRC_SIZE;
            if end <= data.len() {
                let stored_crc =
                    u32::from_le_bytes([data[end - 4], data[end - 3], data[end - 2], data[end - 1]]);
                if stored_crc == compute_crc32(&data[at..end - CRC_SIZE]) {
                    return Some(at);
                }
            }
        }
        start = at + 1;
    }
    None
}

/// CRC32 (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
