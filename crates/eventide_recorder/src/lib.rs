//! # Eventide Recorder
//!
//! Batched submission of stored events with per-event retry policy.
//!
//! This crate provides:
//! - [`EventRecorder`], the facade that saves events and drains the store
//! - Single-flight submission cycles (one at a time, callers queue up)
//! - Outcome classification: delete, retry, discard or retain each event
//! - A submitter abstraction with a mock and an HTTP implementation
//!
//! ## Submission cycle
//!
//! 1. Draw a batch of non-dirty events, oldest first
//! 2. Fetch the destination profile (once per cycle)
//! 3. Submit the batch and settle every event by its outcome
//! 4. Sweep dirty events and events that ran out of retries
//! 5. Repeat until the store has nothing left to submit
//!
//! ## Key Invariants
//!
//! - Retry counts never decrease
//! - Dirty events are never submitted again
//! - Connectivity and session failures never consume a retry
//! - Bookkeeping is never rolled back
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use eventide_recorder::{
//!     DestinationProfile, EventRecorder, MockSubmitter, RecorderConfig, StaticProfileProvider,
//! };
//! use eventide_storage::InMemoryBackend;
//! use eventide_store::{Event, EventStore, StoreConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = EventStore::open(InMemoryBackend::new(), StoreConfig::default()).unwrap();
//! let recorder = EventRecorder::open(
//!     RecorderConfig::default(),
//!     store,
//!     Arc::new(MockSubmitter::new()),
//!     Arc::new(StaticProfileProvider::new(DestinationProfile::default())),
//! )
//! .unwrap();
//!
//! recorder.save(Event::new("app.open")).unwrap();
//! let submitted = recorder.submit_all().await.unwrap();
//! assert_eq!(submitted.len(), 1);
//! assert_eq!(recorder.queued(), 0);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod config;
mod error;
mod http;
mod recorder;
mod serializer;
mod source;
mod transport;

pub use classify::{classify_batch_error, classify_event, Disposition, SubmissionOutcome};
pub use config::{RecorderConfig, ACCEPTED_STATUS, REJECTED_STATUS};
pub use error::{AuthFailure, RecorderError, RecorderResult, TransportError};
pub use http::{error_for_status, HttpClient, HttpResponse, HttpSubmitter, SOURCE_HEADER};
pub use recorder::{EventRecorder, RecorderStats};
pub use source::EventSource;
pub use transport::{
    BatchResponse, DestinationProfile, EndpointItemResponse, EventItemResponse, EventSubmitter,
    MockReply, MockSubmitter, ProfileProvider, StaticProfileProvider, SubmissionRequest,
};
