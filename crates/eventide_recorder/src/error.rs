//! Error types for the event recorder.

use eventide_store::StoreError;
use thiserror::Error;

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Errors surfaced by the recorder.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Local store error outside of cycle bookkeeping.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The submitter failed for a whole batch.
    #[error("submission failed: {0}")]
    Transport(#[from] TransportError),

    /// A non-empty batch came back without a single accepted event.
    #[error("none of the {batch_size} submitted events were accepted")]
    NoEventsAccepted {
        /// Size of the batch.
        batch_size: usize,
    },

    /// The task running the cycle panicked.
    #[error("submission task failed: {0}")]
    TaskFailed(String),
}

/// Why an authentication-related failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No user is signed in.
    SignedOut,
    /// The session expired and must be refreshed.
    SessionExpired,
    /// The account type cannot submit events (e.g. guest access disabled).
    UnsupportedAccount,
    /// The identity service reported a failure.
    Service,
    /// Anything else.
    Other,
}

/// Whole-batch failure reported by a submitter.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The destination could not be reached.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Authentication or session failure.
    #[error("auth error ({kind:?}): {message}")]
    Auth {
        /// Failure kind.
        kind: AuthFailure,
        /// Error message.
        message: String,
        /// Underlying cause, if known.
        cause: Option<Box<TransportError>>,
    },

    /// The server refused the request.
    #[error("client error {status}: {message}")]
    Client {
        /// HTTP status, or 0 if not HTTP.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The server failed.
    #[error("server error: {message}")]
    Server {
        /// HTTP status, if any.
        status: Option<u16>,
        /// Error message.
        message: String,
        /// Whether resubmitting may succeed.
        retryable: bool,
    },

    /// The response carried no per-event results.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Unclassified failure.
    #[error("unknown error: {message}")]
    Unknown {
        /// Error message.
        message: String,
        /// Underlying cause, if known.
        cause: Option<Box<TransportError>>,
    },
}

impl TransportError {
    /// Creates a connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity(message.into())
    }

    /// Creates an auth error without an underlying cause.
    pub fn auth(kind: AuthFailure, message: impl Into<String>) -> Self {
        Self::Auth {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a retryable server error.
    pub fn server_retryable(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable server error.
    pub fn server_fatal(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an unclassified error without an underlying cause.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches an underlying cause to an `Auth` or `Unknown` error. Other
    /// variants are returned unchanged.
    #[must_use]
    pub fn caused_by(self, underlying: TransportError) -> Self {
        match self {
            Self::Auth { kind, message, .. } => Self::Auth {
                kind,
                message,
                cause: Some(Box::new(underlying)),
            },
            Self::Unknown { message, .. } => Self::Unknown {
                message,
                cause: Some(Box::new(underlying)),
            },
            other => other,
        }
    }

    /// The underlying cause, if any.
    pub fn cause(&self) -> Option<&TransportError> {
        match self {
            Self::Auth { cause, .. } | Self::Unknown { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { retryable: true, .. })
    }
}
