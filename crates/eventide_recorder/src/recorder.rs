//! The event recorder.

use crate::classify::{classify_batch_error, classify_event, Disposition, SubmissionOutcome};
use crate::config::{RecorderConfig, ACCEPTED_STATUS};
use crate::error::{RecorderError, RecorderResult, TransportError};
use crate::serializer::SingleFlight;
use crate::transport::{
    BatchResponse, DestinationProfile, EventSubmitter, ProfileProvider, SubmissionRequest,
};
use eventide_storage::StorageBackend;
use eventide_store::{Batch, Event, EventStore, StoreResult, StoreStats, StoredEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counters over the lifetime of a recorder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    /// Calls to `submit_all`.
    pub cycles_started: u64,
    /// Cycles that returned successfully.
    pub cycles_completed: u64,
    /// Cycles that returned an error.
    pub cycles_failed: u64,
    /// Events the server accepted.
    pub events_submitted: u64,
    /// Events marked dirty after a submission.
    pub events_rejected: u64,
    /// Retry increments applied.
    pub events_retried: u64,
    /// Message of the last cycle error.
    pub last_error: Option<String>,
}

struct Shared<B: StorageBackend> {
    config: RecorderConfig,
    store: Mutex<EventStore<B>>,
    submitter: Arc<dyn EventSubmitter>,
    profiles: Arc<dyn ProfileProvider>,
    flight: SingleFlight,
    stats: Mutex<RecorderStats>,
}

/// Records events durably and submits them in batches.
///
/// Cloning is cheap and every clone drives the same store. At most one
/// submission cycle runs at a time; see [`submit_all`](Self::submit_all).
pub struct EventRecorder<B: StorageBackend + 'static> {
    shared: Arc<Shared<B>>,
}

impl<B: StorageBackend + 'static> Clone for EventRecorder<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: StorageBackend + 'static> EventRecorder<B> {
    /// Creates a recorder over `store`.
    ///
    /// Dirty events left over from an earlier run are removed and the store
    /// is pruned to its byte limit.
    ///
    /// # Errors
    ///
    /// Returns an error if that cleanup cannot be persisted.
    pub fn open(
        config: RecorderConfig,
        mut store: EventStore<B>,
        submitter: Arc<dyn EventSubmitter>,
        profiles: Arc<dyn ProfileProvider>,
    ) -> RecorderResult<Self> {
        let removed = store.remove_dirty()?;
        let pruned = store.prune_to_limit()?;
        info!(
            events = store.len(),
            removed_dirty = removed,
            pruned,
            "Event recorder opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                store: Mutex::new(store),
                submitter,
                profiles,
                flight: SingleFlight::new(),
                stats: Mutex::new(RecorderStats::default()),
            }),
        })
    }

    /// The recorder configuration.
    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    /// Queues an event. Returns whether the event is still queued when the
    /// call returns.
    ///
    /// If the store goes over its byte limit the oldest events are evicted
    /// and the save still succeeds. An event larger than the whole limit is
    /// evicted itself, in which case this returns `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be persisted or its id is
    /// already queued.
    pub fn save(&self, event: Event) -> RecorderResult<bool> {
        let mut store = self.shared.store.lock();
        let event_id = event.id.clone();
        match store.save(event) {
            Ok(()) => {
                debug!(event_id = %event_id, "Event saved");
                Ok(true)
            }
            Err(e) if e.is_capacity_exceeded() => {
                let evicted = store.prune_to_limit()?;
                let kept = store.get(&event_id).is_some();
                if kept {
                    warn!(
                        event_id = %event_id,
                        evicted,
                        "Event store over its byte limit, evicted oldest events"
                    );
                } else {
                    warn!(
                        event_id = %event_id,
                        evicted,
                        byte_limit = store.config().byte_limit,
                        "Event does not fit in the event store, it was evicted along with older events"
                    );
                }
                Ok(kept)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Merges `attributes` into every queued event of `event_type` from
    /// `session_id`. Returns how many events were updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the updates cannot be persisted.
    pub fn update_attributes(
        &self,
        event_type: &str,
        session_id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> RecorderResult<usize> {
        let updated = self
            .shared
            .store
            .lock()
            .update_attributes(event_type, session_id, attributes)?;
        debug!(event_type, session_id, updated, "Updated event attributes");
        Ok(updated)
    }

    /// Submits every queued event, batch by batch, and returns the events
    /// the server accepted.
    ///
    /// If a cycle is already running this call waits for it to finish and
    /// then runs a cycle of its own. The cycle runs on a spawned task, so
    /// dropping the returned future does not stop it.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::Transport`] if a batch failed as a whole
    /// - [`RecorderError::NoEventsAccepted`] if a batch got results but none
    ///   was an acceptance
    /// - [`RecorderError::TaskFailed`] if the cycle panicked
    ///
    /// Per-event bookkeeping has been applied in every case.
    pub async fn submit_all(&self) -> RecorderResult<Vec<Event>> {
        self.shared.stats.lock().cycles_started += 1;
        let shared = Arc::clone(&self.shared);
        let handle = self.shared.flight.spawn(async move { shared.run_cycle().await });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let err = RecorderError::TaskFailed(e.to_string());
                let mut stats = self.shared.stats.lock();
                stats.cycles_failed += 1;
                stats.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Whether a submission cycle is running or waiting to run.
    pub fn is_submitting(&self) -> bool {
        self.shared.flight.pending() > 0
    }

    /// Recorder counters.
    pub fn stats(&self) -> RecorderStats {
        self.shared.stats.lock().clone()
    }

    /// Store summary.
    pub fn store_stats(&self) -> StoreStats {
        self.shared.store.lock().stats()
    }

    /// Number of queued events, dirty ones included.
    pub fn queued(&self) -> usize {
        self.shared.store.lock().len()
    }

    /// A queued event by id.
    pub fn get(&self, id: &str) -> Option<StoredEvent> {
        self.shared.store.lock().get(id).cloned()
    }
}

impl<B: StorageBackend + 'static> Shared<B> {
    async fn run_cycle(&self) -> RecorderResult<Vec<Event>> {
        let result = self.drain().await;

        let mut stats = self.stats.lock();
        match &result {
            Ok(submitted) => {
                stats.cycles_completed += 1;
                info!(submitted = submitted.len(), "Submission cycle finished");
            }
            Err(e) => {
                stats.cycles_failed += 1;
                stats.last_error = Some(e.to_string());
                warn!(error = %e, "Submission cycle failed");
            }
        }
        result
    }

    /// Submits batches until every event queued when the cycle reached it
    /// has been attempted once. Events left over for a retry wait for the
    /// next cycle.
    async fn drain(&self) -> RecorderResult<Vec<Event>> {
        let mut submitted = Vec::new();

        let mut batch = self.next_batch(None);
        if batch.is_empty() {
            debug!("No events to submit");
            return Ok(submitted);
        }

        let profile = self.profiles.current_profile().await;
        loop {
            let attempted = batch.events().last().map(|stored| stored.sequence);
            let result = self.submit_batch(&batch, &profile, &mut submitted).await;
            self.sweep();
            result?;

            batch = self.next_batch(attempted);
            if batch.is_empty() {
                break;
            }
        }
        Ok(submitted)
    }

    fn next_batch(&self, after: Option<u64>) -> Batch {
        self.store
            .lock()
            .get_batch_after(after, self.config.batch_size)
    }

    async fn submit_batch(
        &self,
        batch: &Batch,
        profile: &DestinationProfile,
        submitted: &mut Vec<Event>,
    ) -> RecorderResult<()> {
        let request = SubmissionRequest::new(batch, profile.clone());
        debug!(count = batch.len(), sources = ?request.sources, "Submitting batch");

        match self.submitter.submit(&request).await {
            Ok(response) => self.reconcile(batch, &response, submitted),
            Err(error) => self.fail_batch(batch, error),
        }
    }

    fn reconcile(
        &self,
        batch: &Batch,
        response: &BatchResponse,
        submitted: &mut Vec<Event>,
    ) -> RecorderResult<()> {
        if let Some(endpoint) = &response.endpoint {
            if endpoint.status_code == ACCEPTED_STATUS {
                debug!("Endpoint profile updated");
            } else {
                warn!(
                    status = endpoint.status_code,
                    reason = endpoint.message.as_deref().unwrap_or_default(),
                    "Endpoint profile update failed"
                );
            }
        }

        let mut accepted = 0usize;
        for stored in batch {
            let Some(item) = response.events.get(stored.id()) else {
                continue;
            };
            let outcome = classify_event(item, &self.config);
            if outcome == SubmissionOutcome::Accepted {
                accepted += 1;
                submitted.push(stored.event.clone());
            }
            self.settle(stored, outcome, item.message.as_deref());
        }

        if accepted == 0 {
            return Err(RecorderError::NoEventsAccepted {
                batch_size: batch.len(),
            });
        }
        Ok(())
    }

    fn fail_batch(&self, batch: &Batch, error: TransportError) -> RecorderResult<()> {
        if let TransportError::Malformed(message) = &error {
            warn!(count = batch.len(), reason = %message, "Malformed response, events left queued");
            return Err(error.into());
        }

        let outcome = classify_batch_error(&error);
        warn!(
            count = batch.len(),
            error = %error,
            ?outcome,
            "Batch submission failed"
        );
        let message = error.to_string();
        for stored in batch {
            self.settle(stored, outcome, Some(&message));
        }
        Err(error.into())
    }

    fn settle(&self, stored: &StoredEvent, outcome: SubmissionOutcome, message: Option<&str>) {
        let event_id = stored.id();
        let reason = message.unwrap_or_default();
        match outcome.disposition() {
            Disposition::Delete => {
                info!(event_id, "Event submitted");
                self.stats.lock().events_submitted += 1;
                self.with_store("delete event", |s| s.delete_event(event_id));
            }
            Disposition::Discard => {
                warn!(event_id, reason, "Event rejected, it will be discarded");
                self.stats.lock().events_rejected += 1;
                self.with_store("mark event dirty", |s| s.mark_dirty(event_id));
            }
            Disposition::Retry => {
                if stored.retry_count.saturating_add(1) < self.config.max_retries {
                    warn!(event_id, reason, "Event submission failed, it will be retried");
                } else {
                    warn!(event_id, reason, "Event submission failed, it will be discarded");
                }
                self.stats.lock().events_retried += 1;
                self.with_store("increment retry", |s| s.increment_retry(event_id));
            }
            Disposition::Retain => {}
        }
    }

    fn sweep(&self) {
        let max_retries = self.config.max_retries;
        if let Some(removed) =
            self.with_store("sweep", |s| s.remove_dirty_and_exhausted(max_retries))
        {
            if removed > 0 {
                info!(removed, "Removed dirty and exhausted events");
            }
        }
    }

    /// Runs a bookkeeping write, retrying it a bounded number of times.
    /// Failures are logged and swallowed.
    fn with_store<T>(
        &self,
        operation: &str,
        op: impl Fn(&mut EventStore<B>) -> StoreResult<T>,
    ) -> Option<T> {
        let attempts = self.config.storage_op_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let result = op(&mut *self.store.lock());
            match result {
                Ok(value) => return Some(value),
                Err(e) if attempt < attempts => {
                    debug!(operation, attempt, error = %e, "Store operation failed, retrying");
                }
                Err(e) => {
                    error!(operation, error = %e, "Store operation failed");
                }
            }
        }
        None
    }
}
