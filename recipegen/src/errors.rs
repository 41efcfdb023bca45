//! Error types for the generation pipeline.
//!
//! The taxonomy separates a single failed upstream attempt ([`UpstreamError`])
//! from the terminal outcome of a run ([`GenerationError`]), and both from the
//! collaborator failures raised by the data store and object storage.

use std::fmt;
use thiserror::Error;

/// The shape of a failed attempt against the external generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The service answered with a non-success HTTP status.
    Status(u16),
    /// The request never produced a response (connect, TLS, timeout).
    Network,
    /// The response arrived but did not have the expected shape.
    MalformedResponse,
    /// The response was well-formed but carried nothing usable.
    EmptyResult,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {code}"),
            Self::Network => write!(f, "network"),
            Self::MalformedResponse => write!(f, "malformed response"),
            Self::EmptyResult => write!(f, "empty result"),
        }
    }
}

/// One failed attempt against the external generation service.
#[derive(Debug, Clone, Error)]
#[error("upstream {kind}: {message}")]
pub struct UpstreamError {
    /// What went wrong, used for retry classification.
    pub kind: UpstreamErrorKind,
    /// Human readable detail (response body, transport error text).
    pub message: String,
}

impl UpstreamError {
    /// Creates a new upstream error.
    #[must_use]
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an error for a non-success HTTP status.
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Status(code), message)
    }

    /// Creates a transport-level error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Network, message)
    }

    /// Creates an error for a response that could not be parsed.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::MalformedResponse, message)
    }

    /// Creates an error for a successful but empty response.
    #[must_use]
    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::EmptyResult, message)
    }

    /// Returns the HTTP status code, if the error carries one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            UpstreamErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

/// Errors raised by the persistence gateway.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("record {0} not found")]
    RecordNotFound(u64),

    /// A write would break a record invariant.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The underlying store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors raised by the object storage gateway.
#[derive(Debug, Clone, Error)]
pub enum ObjectStorageError {
    /// The object key is not acceptable to the backend.
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    /// The upload itself failed.
    #[error("upload of '{key}' failed: {reason}")]
    UploadFailed {
        /// The object key.
        key: String,
        /// The backend's reason.
        reason: String,
    },
}

/// The terminal error of a generation run.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request or returned payload can never succeed; not retried.
    #[error("fatal input: {0}")]
    FatalInput(String),

    /// The external service failed in a way that is not worth retrying.
    #[error("upstream call failed: {0}")]
    Upstream(#[source] UpstreamError),

    /// Every allowed attempt failed with a retryable error.
    #[error("exhausted {attempts} attempts: {last}")]
    Exhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The last underlying cause.
        #[source]
        last: UpstreamError,
    },

    /// The run's deadline elapsed or it was otherwise cancelled.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// A persistence write failed.
    #[error("persistence: {0}")]
    Persistence(#[from] StoreError),

    /// The image upload failed.
    #[error("object storage: {0}")]
    ObjectStorage(#[from] ObjectStorageError),

    /// The structured payload could not be decoded or encoded.
    #[error("payload: {0}")]
    Payload(String),
}

impl GenerationError {
    /// Returns a short, stable label for logs and events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::FatalInput(_) => "fatal_input",
            Self::Upstream(_) => "upstream",
            Self::Exhausted { .. } => "exhausted",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Persistence(_) => "persistence",
            Self::ObjectStorage(_) => "object_storage",
            Self::Payload(_) => "payload",
        }
    }

    /// Returns true if the run ended because it was cancelled.
    #[must_use]
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_))
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

/// Why an inbound request was turned away before reaching the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The caller's source address has used up its bucket.
    #[error("too many requests from {0}")]
    AddressThrottled(String),

    /// The shared credential's bucket is empty; callers may supply their own.
    #[error("too many requests on the shared credential; supply a personal key")]
    SharedCredentialSaturated,
}

/// Errors returned synchronously to the caller of a submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The request was rate limited.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The draft record could not be created.
    #[error("failed to create draft: {0}")]
    Draft(#[from] StoreError),

    /// The request itself is unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors raised while loading configuration or credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The offending path.
        path: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file contents are not valid.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// The offending path.
        path: String,
        /// The parser's message.
        reason: String,
    },

    /// A credential pool needs at least one credential.
    #[error("credential pool requires at least one credential")]
    NoCredentials,

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// The field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
