//! Error types for the agent runtime.
//!
//! The taxonomy is closed and mechanical: `ErrorKind` drives retry and
//! categorization decisions, while the human-readable `message` is for
//! display. Foreign errors (HTTP, JSON, filesystem) are classified into a
//! kind on conversion rather than wrapped opaquely, so callers never need to
//! downcast.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of error kinds. Kinds are mechanical (used for
/// retry/classification); the accompanying `message` on `Error` is for
/// humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credentials rejected or missing.
    Authentication,
    /// Provider asked the caller to slow down.
    RateLimit,
    /// The request was malformed in a way the provider could detect.
    InvalidRequest,
    /// Transport-level failure: DNS, connection refused, reset, etc.
    Network,
    /// A deadline (connect, inter-chunk, or end-to-end) was exceeded.
    Timeout,
    /// The provider returned a 5xx or otherwise failed server-side.
    ServerError,
    /// The account/key has exhausted its quota.
    QuotaExceeded,
    /// The requested model id or deployment does not exist.
    ModelNotFound,
    /// The provider's content filter rejected the request or response.
    ContentFilter,
    /// The assembled prompt exceeds the model's context window.
    ContextLength,
    /// Tool execution, registry, or other internal-to-the-runtime failure
    /// that does not originate from the provider wire.
    Tool,
    /// Security policy rejected a path, operation, or content.
    PolicyDenied,
    /// The operator declined an approval request.
    ApprovalDenied,
    /// Anything that doesn't classify cleanly; also the panic-containment
    /// kind (see the C3 dispatch boundary).
    Unknown,
}

impl ErrorKind {
    /// {Network, Timeout, RateLimit, ServerError} retry; all others do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit | ErrorKind::ServerError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::ModelNotFound => "model_not_found",
            ErrorKind::ContentFilter => "content_filter",
            ErrorKind::ContextLength => "context_length",
            ErrorKind::Tool => "tool",
            ErrorKind::PolicyDenied => "policy_denied",
            ErrorKind::ApprovalDenied => "approval_denied",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The runtime's single error type. Carries a mechanical `kind` plus enough
/// context (status, request id, details) to render a useful message without
/// the caller needing to downcast `source`.
#[derive(Error, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub status: Option<u16>,
    pub request_id: Option<String>,
    pub details: HashMap<String, String>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if let Some(id) = &self.request_id {
            write!(f, " [request_id={id}]")?;
        }
        Ok(())
    }
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            status: None,
            request_id: None,
            details: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// §4.1 retryability predicate.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    // --- Convenience constructors, one per kind -----------------------

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, msg)
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }

    pub fn server_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, msg)
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExceeded, msg)
    }

    pub fn model_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelNotFound, msg)
    }

    pub fn content_filter(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContentFilter, msg)
    }

    pub fn context_length(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContextLength, msg)
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Tool, msg)
    }

    pub fn policy_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyDenied, msg)
    }

    pub fn approval_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApprovalDenied, msg)
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, msg)
    }
}

/// Classifies a `reqwest::Error` by inspecting its status code and the
/// `is_timeout`/`is_connect` predicates rather than wrapping it opaquely.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Network
        } else {
            match status {
                Some(401) | Some(403) => ErrorKind::Authentication,
                Some(404) => ErrorKind::ModelNotFound,
                Some(429) => ErrorKind::RateLimit,
                Some(s) if (400..500).contains(&s) => ErrorKind::InvalidRequest,
                Some(s) if (500..600).contains(&s) => ErrorKind::ServerError,
                _ => ErrorKind::Network,
            }
        };
        let message = err.to_string();
        let mut e = Error::new(kind, message).with_source(err);
        if let Some(status) = status {
            e = e.with_status(status);
        }
        e
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::InvalidRequest, format!("JSON error: {err}")).with_source(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Unknown, format!("I/O error: {err}")).with_source(err)
    }
}
