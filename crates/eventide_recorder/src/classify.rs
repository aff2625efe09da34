//! Outcome classification.
//!
//! Every submitted event ends a cycle with one [`SubmissionOutcome`], either
//! read from its own entry in the server response or derived from the
//! error that failed the whole batch. The outcome's [`Disposition`] says
//! what happens to the stored event.

use crate::config::{RecorderConfig, ACCEPTED_STATUS, REJECTED_STATUS};
use crate::error::{AuthFailure, TransportError};
use crate::transport::EventItemResponse;

/// Result of submitting one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The server took the event.
    Accepted,
    /// The server will never take the event.
    ClientRejected,
    /// A failure that may clear up on resubmission.
    TransientFailure,
    /// The destination was unreachable.
    ConnectivityFailure,
    /// No usable session or account.
    AuthFailure,
    /// A failure that could not be classified.
    Unrecoverable,
}

/// What to do with a stored event after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delete it; it was delivered.
    Delete,
    /// Mark it dirty so it is purged.
    Discard,
    /// Increment its retry count.
    Retry,
    /// Leave it as it is.
    Retain,
}

impl SubmissionOutcome {
    /// Bookkeeping for this outcome.
    pub const fn disposition(self) -> Disposition {
        match self {
            Self::Accepted => Disposition::Delete,
            Self::ClientRejected | Self::Unrecoverable => Disposition::Discard,
            Self::TransientFailure => Disposition::Retry,
            Self::ConnectivityFailure | Self::AuthFailure => Disposition::Retain,
        }
    }
}

/// Classifies one event's entry in a batch response.
pub fn classify_event(item: &EventItemResponse, config: &RecorderConfig) -> SubmissionOutcome {
    match item.status_code {
        ACCEPTED_STATUS if item.message.as_deref() == Some(config.accepted_message.as_str()) => {
            SubmissionOutcome::Accepted
        }
        REJECTED_STATUS => SubmissionOutcome::ClientRejected,
        _ => SubmissionOutcome::TransientFailure,
    }
}

/// Classifies an error that failed a whole batch.
///
/// `Auth` and `Unknown` errors that do not decide the outcome themselves
/// defer to their underlying cause; the chain is walked until a deciding
/// error or its end.
pub fn classify_batch_error(error: &TransportError) -> SubmissionOutcome {
    let mut current = error;
    loop {
        match current {
            TransportError::Connectivity(_) => return SubmissionOutcome::ConnectivityFailure,
            TransportError::Auth {
                kind:
                    AuthFailure::SignedOut | AuthFailure::SessionExpired | AuthFailure::UnsupportedAccount,
                ..
            } => return SubmissionOutcome::AuthFailure,
            TransportError::Server {
                retryable: true, ..
            } => return SubmissionOutcome::TransientFailure,
            TransportError::Client { .. } => return SubmissionOutcome::ClientRejected,
            TransportError::Server { .. } | TransportError::Malformed(_) => {
                return SubmissionOutcome::Unrecoverable
            }
            TransportError::Auth { .. } | TransportError::Unknown { .. } => match current.cause() {
                Some(cause) => current = cause,
                None => return SubmissionOutcome::Unrecoverable,
            },
        }
    }
}
