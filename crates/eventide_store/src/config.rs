//! Store configuration.

/// Default live-byte budget: 5 MiB.
pub const DEFAULT_BYTE_LIMIT: u64 = 5 * 1024 * 1024;

/// Configuration for an [`crate::EventStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum live bytes before `save` reports
    /// [`crate::StoreError::CapacityExceeded`].
    pub byte_limit: u64,

    /// Whether every mutation is fsynced before returning. When off, writes
    /// are only flushed to the OS.
    pub sync_on_write: bool,

    /// Log size below which automatic compaction never runs.
    pub compaction_min_bytes: u64,

    /// Compact once the log is this many times larger than the live bytes.
    pub compaction_ratio: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            byte_limit: DEFAULT_BYTE_LIMIT,
            sync_on_write: true,
            compaction_min_bytes: 256 * 1024,
            compaction_ratio: 2,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the live-byte budget.
    #[must_use]
    pub const fn byte_limit(mut self, limit: u64) -> Self {
        self.byte_limit = limit;
        self
    }

    /// Sets whether each mutation is fsynced.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the minimum log size for automatic compaction.
    #[must_use]
    pub const fn compaction_min_bytes(mut self, bytes: u64) -> Self {
        self.compaction_min_bytes = bytes;
        self
    }

    /// Sets the log-to-live ratio that triggers compaction. Values below 1
    /// are treated as 1.
    #[must_use]
    pub const fn compaction_ratio(mut self, ratio: u64) -> Self {
        self.compaction_ratio = if ratio == 0 { 1 } else { ratio };
        self
    }

    pub(crate) fn wants_compaction(&self, log_bytes: u64, live_bytes: u64) -> bool {
        log_bytes >= self.compaction_min_bytes
            && log_bytes > live_bytes.saturating_mul(self.compaction_ratio)
    }
}
