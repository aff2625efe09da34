//! End-to-end submission cycles against a mock submitter.

use eventide_recorder::{
    AuthFailure, BatchResponse, DestinationProfile, EventItemResponse, EventRecorder,
    EventSource, MockReply, MockSubmitter, RecorderConfig, RecorderError, StaticProfileProvider,
    TransportError,
};
use eventide_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageResult};
use eventide_store::{Event, EventStore, StoreConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    recorder: EventRecorder<InMemoryBackend>,
    submitter: Arc<MockSubmitter>,
    profiles: Arc<StaticProfileProvider>,
}

fn harness_with(config: RecorderConfig, store: EventStore<InMemoryBackend>) -> Harness {
    let submitter = Arc::new(MockSubmitter::new());
    let profiles = Arc::new(StaticProfileProvider::new(DestinationProfile {
        application_id: "app-1".into(),
        endpoint_id: "device-1".into(),
        ..Default::default()
    }));
    let recorder = EventRecorder::open(config, store, submitter.clone(), profiles.clone()).unwrap();
    Harness {
        recorder,
        submitter,
        profiles,
    }
}

fn harness() -> Harness {
    let store = EventStore::open(InMemoryBackend::new(), StoreConfig::default()).unwrap();
    harness_with(RecorderConfig::default(), store)
}

fn save_n(recorder: &EventRecorder<InMemoryBackend>, n: usize) {
    for i in 0..n {
        recorder
            .save(Event::with_id(format!("e-{i}"), "screen_view"))
            .unwrap();
    }
}

#[tokio::test]
async fn empty_store_is_a_successful_noop() {
    let h = harness();

    let submitted = h.recorder.submit_all().await.unwrap();
    assert!(submitted.is_empty());
    assert!(h.submitter.requests().is_empty());
    assert_eq!(h.profiles.fetches(), 0);
    assert_eq!(h.recorder.stats().cycles_completed, 1);
}

#[tokio::test]
async fn drains_every_batch_in_one_cycle() {
    let h = harness();
    save_n(&h.recorder, 150);

    let submitted = h.recorder.submit_all().await.unwrap();
    assert_eq!(submitted.len(), 150);
    assert_eq!(submitted[0].id, "e-0");
    assert_eq!(submitted[149].id, "e-149");

    let requests = h.submitter.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].events.len(), 100);
    assert_eq!(requests[1].events.len(), 50);
    assert_eq!(h.profiles.fetches(), 1);
    assert_eq!(h.recorder.queued(), 0);
    assert_eq!(h.recorder.stats().events_submitted, 150);
}

#[tokio::test]
async fn client_rejected_events_are_discarded() {
    let h = harness();
    save_n(&h.recorder, 3);
    h.submitter.push_reply(MockReply::Respond(
        BatchResponse::accepting(["e-0", "e-2"])
            .with_event("e-1", EventItemResponse::rejected("invalid attribute")),
    ));

    let submitted = h.recorder.submit_all().await.unwrap();
    let ids: Vec<_> = submitted.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["e-0", "e-2"]);

    assert_eq!(h.recorder.queued(), 0);
    assert_eq!(h.submitter.requests().len(), 1);
    assert_eq!(h.recorder.stats().events_rejected, 1);
}

#[tokio::test]
async fn retryable_failures_count_up_then_get_swept() {
    let h = harness();
    save_n(&h.recorder, 2);
    h.submitter
        .set_default_reply(MockReply::Uniform(EventItemResponse::new(500, "Internal")));

    for expected_retry in 1..=2 {
        let err = h.recorder.submit_all().await.unwrap_err();
        assert!(matches!(err, RecorderError::NoEventsAccepted { batch_size: 2 }));
        assert_eq!(h.recorder.get("e-0").unwrap().retry_count, expected_retry);
        assert_eq!(h.recorder.get("e-1").unwrap().retry_count, expected_retry);
    }

    assert!(h.recorder.submit_all().await.is_err());
    assert_eq!(h.recorder.queued(), 0);

    let stats = h.recorder.stats();
    assert_eq!(stats.cycles_failed, 3);
    assert_eq!(stats.events_retried, 6);
    assert!(stats.last_error.unwrap().contains("none of the 2"));
}

#[tokio::test]
async fn connectivity_failure_leaves_events_untouched() {
    let h = harness();
    save_n(&h.recorder, 5);
    h.submitter
        .push_reply(MockReply::Fail(TransportError::connectivity("no network")));

    let err = h.recorder.submit_all().await.unwrap_err();
    assert!(matches!(
        err,
        RecorderError::Transport(TransportError::Connectivity(_))
    ));

    assert_eq!(h.recorder.queued(), 5);
    for i in 0..5 {
        assert_eq!(h.recorder.get(&format!("e-{i}")).unwrap().retry_count, 0);
    }

    let submitted = h.recorder.submit_all().await.unwrap();
    assert_eq!(submitted.len(), 5);
}

#[tokio::test]
async fn session_expiry_leaves_events_untouched() {
    let h = harness();
    save_n(&h.recorder, 2);
    h.submitter.push_reply(MockReply::Fail(TransportError::auth(
        AuthFailure::SessionExpired,
        "token expired",
    )));

    assert!(h.recorder.submit_all().await.is_err());
    assert_eq!(h.recorder.get("e-0").unwrap().retry_count, 0);
    assert!(!h.recorder.get("e-1").unwrap().dirty);
}

#[tokio::test]
async fn auth_error_defers_to_its_cause() {
    let h = harness();
    save_n(&h.recorder, 2);
    h.submitter.push_reply(MockReply::Fail(
        TransportError::auth(AuthFailure::Service, "credentials")
            .caused_by(TransportError::server_retryable(Some(503), "throttled")),
    ));

    assert!(h.recorder.submit_all().await.is_err());
    assert_eq!(h.recorder.get("e-0").unwrap().retry_count, 1);
    assert_eq!(h.recorder.get("e-1").unwrap().retry_count, 1);
}

#[tokio::test]
async fn unclassified_failure_discards_the_batch() {
    let h = harness();
    save_n(&h.recorder, 4);
    h.submitter
        .push_reply(MockReply::Fail(TransportError::unknown("unexpected")));

    assert!(h.recorder.submit_all().await.is_err());
    assert_eq!(h.recorder.queued(), 0);
    assert_eq!(h.recorder.stats().events_rejected, 4);
}

#[tokio::test]
async fn malformed_response_fails_without_bookkeeping() {
    let h = harness();
    save_n(&h.recorder, 3);
    h.submitter
        .push_reply(MockReply::Fail(TransportError::Malformed("no results".into())));

    let err = h.recorder.submit_all().await.unwrap_err();
    assert!(matches!(
        err,
        RecorderError::Transport(TransportError::Malformed(_))
    ));
    assert_eq!(h.recorder.queued(), 3);
    assert_eq!(h.recorder.store_stats().max_retry_count, 0);
}

#[tokio::test]
async fn unknown_and_missing_ids_in_response() {
    let h = harness();
    save_n(&h.recorder, 2);
    h.submitter.push_reply(MockReply::Respond(BatchResponse::accepting([
        "e-0",
        "not-in-batch",
    ])));

    let submitted = h.recorder.submit_all().await.unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(h.submitter.requests().len(), 1);
    assert_eq!(h.recorder.get("e-1").unwrap().retry_count, 0);

    let submitted = h.recorder.submit_all().await.unwrap();
    assert_eq!(submitted[0].id, "e-1");

    let requests = h.submitter.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].ids(), ["e-1"]);
}

#[tokio::test]
async fn mixed_batch_attempts_each_event_once_per_cycle() {
    let h = harness();
    h.recorder.save(Event::with_id("ok", "screen_view")).unwrap();
    h.recorder
        .save(Event::with_id("flaky", "screen_view"))
        .unwrap();
    h.submitter.push_reply(MockReply::Respond(
        BatchResponse::accepting(["ok"]).with_event("flaky", EventItemResponse::new(500, "Internal")),
    ));
    h.submitter
        .set_default_reply(MockReply::Uniform(EventItemResponse::new(500, "Internal")));

    let submitted = h.recorder.submit_all().await.unwrap();
    let ids: Vec<_> = submitted.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["ok"]);

    assert_eq!(h.submitter.requests().len(), 1);
    assert_eq!(h.recorder.get("flaky").unwrap().retry_count, 1);
    assert!(h.recorder.get("ok").is_none());
}

#[tokio::test]
async fn retried_events_do_not_block_later_batches() {
    let store = EventStore::open(InMemoryBackend::new(), StoreConfig::default()).unwrap();
    let h = harness_with(RecorderConfig::default().with_batch_size(2), store);
    save_n(&h.recorder, 4);
    h.submitter.push_reply(MockReply::Respond(
        BatchResponse::accepting(["e-0"]).with_event("e-1", EventItemResponse::new(503, "Busy")),
    ));

    let submitted = h.recorder.submit_all().await.unwrap();
    assert_eq!(submitted.len(), 3);

    let requests = h.submitter.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].ids(), ["e-2", "e-3"]);
    assert_eq!(h.recorder.queued(), 1);
    assert_eq!(h.recorder.get("e-1").unwrap().retry_count, 1);
}

#[tokio::test]
async fn overlapping_calls_run_two_sequential_cycles() {
    let h = harness();
    save_n(&h.recorder, 3);
    h.submitter.set_delay(Duration::from_millis(20));

    let (first, second) = tokio::join!(h.recorder.submit_all(), h.recorder.submit_all());

    let mut sizes = [first.unwrap().len(), second.unwrap().len()];
    sizes.sort_unstable();
    assert_eq!(sizes, [0, 3]);
    assert_eq!(h.submitter.max_in_flight(), 1);

    let stats = h.recorder.stats();
    assert_eq!(stats.cycles_started, 2);
    assert_eq!(stats.cycles_completed, 2);
    assert!(!h.recorder.is_submitting());
}

#[tokio::test]
async fn saves_proceed_while_a_cycle_is_in_flight() {
    let h = harness();
    save_n(&h.recorder, 1);
    h.submitter.set_delay(Duration::from_millis(50));

    let recorder = h.recorder.clone();
    let cycle = tokio::spawn(async move { recorder.submit_all().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.recorder.is_submitting());
    h.recorder
        .save(Event::with_id("late", "screen_view"))
        .unwrap();

    let submitted = cycle.await.unwrap().unwrap();
    let ids: Vec<_> = submitted.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["e-0", "late"]);
}

#[tokio::test]
async fn dropped_caller_does_not_abort_the_cycle() {
    let h = harness();
    save_n(&h.recorder, 2);
    h.submitter.set_delay(Duration::from_millis(30));

    let abandoned = tokio::time::timeout(Duration::from_millis(5), h.recorder.submit_all()).await;
    assert!(abandoned.is_err());

    let next = h.recorder.submit_all().await.unwrap();
    assert!(next.is_empty());
    assert_eq!(h.recorder.queued(), 0);
    assert_eq!(h.submitter.requests().len(), 1);
}

#[tokio::test]
async fn batches_carry_their_sources() {
    let h = harness();
    h.recorder.save(Event::new("_session.start")).unwrap();
    h.recorder
        .save(Event::new("_campaign.opened_notification"))
        .unwrap();

    h.recorder.submit_all().await.unwrap();

    let sources: Vec<_> = h.submitter.requests()[0].sources.iter().copied().collect();
    assert_eq!(
        sources,
        [EventSource::Analytics, EventSource::PushNotifications]
    );
    assert_eq!(h.submitter.requests()[0].profile.application_id, "app-1");
}

#[tokio::test]
async fn open_removes_dirty_events() {
    let mut store = EventStore::open(InMemoryBackend::new(), StoreConfig::default()).unwrap();
    store.save(Event::with_id("dirty", "x")).unwrap();
    store.save(Event::with_id("clean", "x")).unwrap();
    store.mark_dirty("dirty").unwrap();

    let h = harness_with(RecorderConfig::default(), store);
    assert_eq!(h.recorder.queued(), 1);
    assert!(h.recorder.get("clean").is_some());
    assert_eq!(h.recorder.store_stats().dirty, 0);
}

#[tokio::test]
async fn save_prunes_when_over_capacity() {
    let store = EventStore::open(
        InMemoryBackend::new(),
        StoreConfig::new().byte_limit(1_000),
    )
    .unwrap();
    let h = harness_with(RecorderConfig::default(), store);

    save_n(&h.recorder, 50);

    let stats = h.recorder.store_stats();
    assert!(stats.live_bytes <= 1_000);
    assert!(h.recorder.get("e-49").is_some());
    assert!(h.recorder.get("e-0").is_none());
}

#[tokio::test]
async fn oversized_event_is_reported_as_evicted() {
    let store = EventStore::open(
        InMemoryBackend::new(),
        StoreConfig::new().byte_limit(1_000),
    )
    .unwrap();
    let h = harness_with(RecorderConfig::default(), store);
    save_n(&h.recorder, 2);

    let huge = Event::with_id("huge", "screen_view").attribute("blob", "x".repeat(2_000));
    assert!(!h.recorder.save(huge).unwrap());
    assert!(h.recorder.get("huge").is_none());
    assert!(h.recorder.store_stats().live_bytes <= 1_000);

    assert!(h
        .recorder
        .save(Event::with_id("small", "screen_view"))
        .unwrap());
}

#[tokio::test]
async fn attributes_can_be_updated_before_submission() {
    let h = harness();
    h.recorder
        .save(Event::with_id("stop", "_session.stop").session("s-1"))
        .unwrap();

    let attrs = BTreeMap::from([("duration_ms".to_string(), "1200".to_string())]);
    assert_eq!(
        h.recorder
            .update_attributes("_session.stop", "s-1", &attrs)
            .unwrap(),
        1
    );

    h.recorder.submit_all().await.unwrap();
    let sent = &h.submitter.requests()[0].events[0];
    assert_eq!(sent.attributes["duration_ms"], "1200");
}

#[tokio::test]
async fn retry_counts_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");
    let profiles = Arc::new(StaticProfileProvider::new(DestinationProfile::default()));

    {
        let submitter = Arc::new(MockSubmitter::new());
        submitter.set_default_reply(MockReply::Fail(TransportError::server_retryable(
            Some(503),
            "unavailable",
        )));
        let store = EventStore::open(FileBackend::open(&path).unwrap(), StoreConfig::default())
            .unwrap();
        let recorder =
            EventRecorder::open(RecorderConfig::default(), store, submitter, profiles.clone())
                .unwrap();
        recorder.save(Event::with_id("e-0", "screen_view")).unwrap();
        assert!(recorder.submit_all().await.is_err());
    }

    let submitter = Arc::new(MockSubmitter::new());
    let store =
        EventStore::open(FileBackend::open(&path).unwrap(), StoreConfig::default()).unwrap();
    let recorder =
        EventRecorder::open(RecorderConfig::default(), store, submitter.clone(), profiles)
            .unwrap();
    assert_eq!(recorder.get("e-0").unwrap().retry_count, 1);

    assert_eq!(recorder.submit_all().await.unwrap().len(), 1);
    assert_eq!(recorder.queued(), 0);
}

/// Lets `pass` appends through, then fails the next `fail` appends.
#[derive(Default)]
struct Faults {
    pass: AtomicUsize,
    fail: AtomicUsize,
}

impl Faults {
    fn arm(&self, pass: usize, fail: usize) {
        self.pass.store(pass, Ordering::SeqCst);
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        let take = |n: &AtomicUsize| {
            n.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_ok()
        };
        !take(&self.pass) && take(&self.fail)
    }
}

struct FaultyBackend {
    inner: InMemoryBackend,
    faults: Arc<Faults>,
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.faults.should_fail() {
            return Err(std::io::Error::other("disk full").into());
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.inner.replace(data)
    }
}

fn faulty_recorder() -> (EventRecorder<FaultyBackend>, Arc<MockSubmitter>, Arc<Faults>) {
    let faults = Arc::new(Faults::default());
    let backend = FaultyBackend {
        inner: InMemoryBackend::new(),
        faults: faults.clone(),
    };
    let store = EventStore::open(backend, StoreConfig::default()).unwrap();
    let submitter = Arc::new(MockSubmitter::new());
    let profiles = Arc::new(StaticProfileProvider::new(DestinationProfile::default()));
    let recorder =
        EventRecorder::open(RecorderConfig::default(), store, submitter.clone(), profiles).unwrap();
    (recorder, submitter, faults)
}

#[tokio::test]
async fn failed_bookkeeping_write_is_retried() {
    let (recorder, _submitter, faults) = faulty_recorder();
    recorder.save(Event::with_id("e-0", "screen_view")).unwrap();
    faults.arm(0, 1);

    let submitted = recorder.submit_all().await.unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(recorder.queued(), 0);
}

#[tokio::test]
async fn persistent_bookkeeping_failures_do_not_fail_the_cycle() {
    let (recorder, submitter, faults) = faulty_recorder();
    recorder.save(Event::with_id("e-0", "screen_view")).unwrap();
    recorder.save(Event::with_id("e-1", "screen_view")).unwrap();
    faults.arm(0, usize::MAX);

    let submitted = recorder.submit_all().await.unwrap();
    assert_eq!(submitted.len(), 2);
    assert_eq!(recorder.queued(), 2);
    assert_eq!(recorder.stats().cycles_completed, 1);
    assert!(recorder.stats().last_error.is_none());

    faults.arm(0, 0);
    assert_eq!(recorder.submit_all().await.unwrap().len(), 2);
    assert_eq!(recorder.queued(), 0);
    assert_eq!(submitter.requests().len(), 2);
}

#[tokio::test]
async fn failed_sweep_is_not_reported_to_the_caller() {
    let (recorder, submitter, faults) = faulty_recorder();
    recorder.save(Event::with_id("ok", "screen_view")).unwrap();
    recorder.save(Event::with_id("bad", "screen_view")).unwrap();
    submitter.push_reply(MockReply::Respond(
        BatchResponse::accepting(["ok"]).with_event("bad", EventItemResponse::rejected("invalid")),
    ));
    // delete "ok" and mark "bad" dirty, then fail both sweep attempts
    faults.arm(2, 2);

    let submitted = recorder.submit_all().await.unwrap();
    let ids: Vec<_> = submitted.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["ok"]);

    assert_eq!(recorder.queued(), 1);
    assert!(recorder.get("bad").unwrap().dirty);
    assert_eq!(recorder.store_stats().dirty, 1);
}
