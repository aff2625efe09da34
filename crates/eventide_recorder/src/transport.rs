//! Submission transport abstraction.

use crate::config::{ACCEPTED_STATUS, REJECTED_STATUS};
use crate::error::TransportError;
use crate::source::EventSource;
use async_trait::async_trait;
use eventide_store::{Batch, Event};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Addressing and identity context attached to every submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationProfile {
    /// Application the events belong to.
    pub application_id: String,
    /// Endpoint (device installation) id.
    pub endpoint_id: String,
    /// Delivery address, e.g. a push token.
    pub address: Option<String>,
    /// Endpoint attributes.
    pub attributes: BTreeMap<String, String>,
}

/// One batch on its way to the destination.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// Events, oldest first.
    pub events: Vec<Event>,
    /// Profile fetched for the current cycle.
    pub profile: DestinationProfile,
    /// Distinct sources of the events.
    pub sources: BTreeSet<EventSource>,
}

impl SubmissionRequest {
    /// Builds a request for `batch`.
    pub fn new(batch: &Batch, profile: DestinationProfile) -> Self {
        let events: Vec<Event> = batch.iter().map(|s| s.event.clone()).collect();
        let sources = EventSource::collect(&events);
        Self {
            events,
            profile,
            sources,
        }
    }

    /// Ids of the events, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Server verdict for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventItemResponse {
    /// Status code for the event.
    pub status_code: u16,
    /// Server message.
    #[serde(default)]
    pub message: Option<String>,
}

impl EventItemResponse {
    /// A response with the given status and message.
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: Some(message.into()),
        }
    }

    /// The canonical acceptance.
    pub fn accepted() -> Self {
        Self::new(ACCEPTED_STATUS, "Accepted")
    }

    /// A client rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(REJECTED_STATUS, message)
    }
}

/// Server verdict for the endpoint profile sent with a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointItemResponse {
    /// Status code for the endpoint update.
    pub status_code: u16,
    /// Server message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Response to a submitted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Per-event results keyed by event id.
    pub events: HashMap<String, EventItemResponse>,
    /// Result of the endpoint update, if the server reported one.
    #[serde(default)]
    pub endpoint: Option<EndpointItemResponse>,
}

impl BatchResponse {
    /// Accepts every id in `ids`.
    pub fn accepting<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self::uniform(ids, &EventItemResponse::accepted())
    }

    /// Gives every id in `ids` the same result.
    pub fn uniform<'a>(ids: impl IntoIterator<Item = &'a str>, item: &EventItemResponse) -> Self {
        Self {
            events: ids
                .into_iter()
                .map(|id| (id.to_string(), item.clone()))
                .collect(),
            endpoint: None,
        }
    }

    /// Overrides the result of one event.
    #[must_use]
    pub fn with_event(mut self, id: impl Into<String>, item: EventItemResponse) -> Self {
        self.events.insert(id.into(), item);
        self
    }

    /// Sets the endpoint result.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: EndpointItemResponse) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

/// Sends batches to the destination.
///
/// Implementations report per-event results in [`BatchResponse`] and
/// reserve [`TransportError`] for failures of the whole request.
#[async_trait]
pub trait EventSubmitter: Send + Sync {
    /// Submits one batch.
    async fn submit(&self, request: &SubmissionRequest) -> Result<BatchResponse, TransportError>;
}

/// Supplies the destination profile for a cycle.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// The current profile.
    async fn current_profile(&self) -> DestinationProfile;
}

/// A provider returning a fixed profile.
#[derive(Debug, Default)]
pub struct StaticProfileProvider {
    profile: DestinationProfile,
    fetches: AtomicUsize,
}

impl StaticProfileProvider {
    /// Creates a provider for `profile`.
    pub fn new(profile: DestinationProfile) -> Self {
        Self {
            profile,
            fetches: AtomicUsize::new(0),
        }
    }

    /// How many times the profile was requested.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileProvider for StaticProfileProvider {
    async fn current_profile(&self) -> DestinationProfile {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.profile.clone()
    }
}

/// Scripted behaviour of a [`MockSubmitter`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Accept every event of the request.
    AcceptAll,
    /// Give every event of the request the same result.
    Uniform(EventItemResponse),
    /// Return this response verbatim.
    Respond(BatchResponse),
    /// Fail the whole request.
    Fail(TransportError),
}

/// A mock submitter for testing.
///
/// Replies are taken from a queue; when it is empty the default reply is
/// used. Every request is recorded.
#[derive(Debug)]
pub struct MockSubmitter {
    queue: Mutex<VecDeque<MockReply>>,
    default_reply: Mutex<MockReply>,
    requests: Mutex<Vec<SubmissionRequest>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSubmitter {
    /// Creates a mock that accepts everything.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(MockReply::AcceptAll),
            requests: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queues a reply for the next request.
    pub fn push_reply(&self, reply: MockReply) {
        self.queue.lock().push_back(reply);
    }

    /// Sets the reply used when the queue is empty.
    pub fn set_default_reply(&self, reply: MockReply) {
        *self.default_reply.lock() = reply;
    }

    /// Makes every request take `delay` before replying.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SubmissionRequest> {
        self.requests.lock().clone()
    }

    /// Highest number of requests that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> MockReply {
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.lock().clone())
    }
}

impl Default for MockSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSubmitter for MockSubmitter {
    async fn submit(&self, request: &SubmissionRequest) -> Result<BatchResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = match self.next_reply() {
            MockReply::AcceptAll => Ok(BatchResponse::accepting(request.ids())),
            MockReply::Uniform(item) => Ok(BatchResponse::uniform(request.ids(), &item)),
            MockReply::Respond(response) => Ok(response),
            MockReply::Fail(error) => Err(error),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_storage::InMemoryBackend;
    use eventide_store::{EventStore, StoreConfig};

    fn request(ids: &[&str]) -> SubmissionRequest {
        let mut store = EventStore::open(InMemoryBackend::new(), StoreConfig::default()).unwrap();
        for id in ids {
            store.save(Event::with_id(*id, "click")).unwrap();
        }
        SubmissionRequest::new(&store.get_batch(100), DestinationProfile::default())
    }

    #[test]
    fn request_keeps_batch_order() {
        let request = request(&["b", "a", "c"]);
        assert_eq!(request.ids(), ["b", "a", "c"]);
        assert_eq!(
            request.sources.into_iter().collect::<Vec<_>>(),
            [EventSource::Analytics]
        );
    }

    #[tokio::test]
    async fn mock_uses_queue_then_default() {
        let mock = MockSubmitter::new();
        mock.push_reply(MockReply::Fail(TransportError::connectivity("offline")));
        mock.set_default_reply(MockReply::Uniform(EventItemResponse::rejected("bad")));

        let request = request(&["a"]);
        assert!(matches!(
            mock.submit(&request).await,
            Err(TransportError::Connectivity(_))
        ));
        let response = mock.submit(&request).await.unwrap();
        assert_eq!(response.events["a"].status_code, 400);
        assert_eq!(mock.requests().len(), 2);
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn static_profile_counts_fetches() {
        let provider = StaticProfileProvider::new(DestinationProfile {
            application_id: "app".into(),
            ..Default::default()
        });
        assert_eq!(provider.current_profile().await.application_id, "app");
        assert_eq!(provider.fetches(), 1);
    }

    #[test]
    fn response_json_shape() {
        let json = r#"{"events":{"e-1":{"status_code":202,"message":"Accepted"}}}"#;
        let response: BatchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.events["e-1"], EventItemResponse::accepted());
        assert!(response.endpoint.is_none());
    }
}
