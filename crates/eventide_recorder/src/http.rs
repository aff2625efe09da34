//! HTTP submitter.
//!
//! Batches are posted as JSON to a single URL. The HTTP client itself is
//! abstracted via [`HttpClient`] so any library (reqwest, hyper, ...) can
//! be plugged in.

use crate::error::{AuthFailure, TransportError};
use crate::transport::{BatchResponse, DestinationProfile, EventSubmitter, SubmissionRequest};
use async_trait::async_trait;
use eventide_store::Event;
use serde::Serialize;
use tracing::debug;

/// Header carrying the comma-separated sources of a batch.
pub const SOURCE_HEADER: &str = "x-eventide-source";

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Failures to get any response at all (DNS, refused connection, timeout)
/// should be reported as [`TransportError::Connectivity`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request.
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse, TransportError>;
}

#[derive(Serialize)]
struct WireBatch<'a> {
    profile: &'a DestinationProfile,
    events: &'a [Event],
}

/// Submits batches over HTTP with JSON bodies.
pub struct HttpSubmitter<C: HttpClient> {
    url: String,
    client: C,
}

impl<C: HttpClient> HttpSubmitter<C> {
    /// Creates a submitter posting to `url`.
    pub fn new(url: impl Into<String>, client: C) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    /// The destination URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn headers(request: &SubmissionRequest) -> Vec<(String, String)> {
        let sources: Vec<&str> = request.sources.iter().map(|s| s.as_str()).collect();
        vec![
            ("content-type".to_string(), "application/json".to_string()),
            (SOURCE_HEADER.to_string(), sources.join(",")),
        ]
    }
}

/// Maps a non-success status to the transport error taxonomy.
pub fn error_for_status(status: u16, body: &[u8]) -> TransportError {
    let message = String::from_utf8_lossy(body).into_owned();
    match status {
        401 => TransportError::auth(AuthFailure::SessionExpired, message),
        403 => TransportError::auth(AuthFailure::Service, "access denied").caused_by(
            TransportError::Client { status, message },
        ),
        429 | 500..=599 => TransportError::server_retryable(Some(status), message),
        400..=499 => TransportError::Client { status, message },
        _ => TransportError::unknown(format!("unexpected status {status}: {message}")),
    }
}

#[async_trait]
impl<C: HttpClient> EventSubmitter for HttpSubmitter<C> {
    async fn submit(&self, request: &SubmissionRequest) -> Result<BatchResponse, TransportError> {
        let body = serde_json::to_vec(&WireBatch {
            profile: &request.profile,
            events: &request.events,
        })
        .map_err(|e| TransportError::unknown(format!("failed to encode batch: {e}")))?;

        debug!(url = %self.url, count = request.events.len(), bytes = body.len(), "Posting batch");
        let response = self
            .client
            .post(&self.url, &Self::headers(request), body)
            .await?;

        if !(200..300).contains(&response.status) {
            return Err(error_for_status(response.status, &response.body));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::Malformed(format!("failed to decode response: {e}")))
    }
}
