//! Configuration for the event recorder.

/// Status code the server uses for an accepted event.
pub const ACCEPTED_STATUS: u16 = 202;

/// Status code the server uses for an event it will never accept.
pub const REJECTED_STATUS: u16 = 400;

/// Configuration for submission cycles.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Maximum events per submitted batch.
    pub batch_size: usize,
    /// Retry count at which an event is swept.
    pub max_retries: u32,
    /// Extra attempts for a failing bookkeeping write before it is only
    /// logged.
    pub storage_op_retries: u32,
    /// Message that must accompany [`ACCEPTED_STATUS`] for an event to count
    /// as accepted.
    pub accepted_message: String,
}

impl RecorderConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            storage_op_retries: 1,
            accepted_message: "Accepted".to_string(),
        }
    }

    /// Sets the batch size. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the retry count at which events are swept.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets how many times a failed bookkeeping write is retried.
    #[must_use]
    pub fn with_storage_op_retries(mut self, retries: u32) -> Self {
        self.storage_op_retries = retries;
        self
    }

    /// Sets the acceptance message.
    #[must_use]
    pub fn with_accepted_message(mut self, message: impl Into<String>) -> Self {
        self.accepted_message = message.into();
        self
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::new()
    }
}
