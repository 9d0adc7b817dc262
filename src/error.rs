//! Huginn error types
//!
//! Two layers:
//!
//! - [`HuginnError`] is *raised*: transport faults, malformed JSON, bad
//!   configuration. Providers use it internally so the retry policy can
//!   decide what to repeat.
//! - [`ErrorKind`] is *returned*: the classified reason a
//!   [`QueryResponse`](crate::QueryResponse) failed. Callers never see a raised
//!   error from a query; everything ends up as a kind plus a message.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raised error type
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HuginnError {
    /// Whether a retry has a chance of succeeding.
    ///
    /// Connection failures, timeouts and unparseable bodies are transient;
    /// configuration and I/O problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HuginnError::Http(_) | HuginnError::Timeout(_) | HuginnError::Json(_)
        )
    }

    /// Response kind for an error that escaped the retry loop.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HuginnError::Http(_) | HuginnError::Timeout(_) => ErrorKind::TransientNetwork,
            HuginnError::Json(_) => ErrorKind::ParseFailure,
            HuginnError::NoProvider | HuginnError::Configuration(_) => ErrorKind::NotConfigured,
            HuginnError::Io(_) => ErrorKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs can carry credentials (Gemini's `?key=`).
        let err = err.without_url();
        if err.is_timeout() {
            HuginnError::Timeout(err.to_string())
        } else {
            HuginnError::Http(err.to_string())
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;

/// Classified reason a query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing credential, endpoint or feature flag. No network call was made.
    NotConfigured,
    InvalidCredential,
    QuotaExceeded,
    /// Model not found, deprecated or not installed.
    ModelUnavailable,
    PermissionDenied,
    MalformedRequest,
    /// Connection-level failure; retried before being surfaced.
    TransientNetwork,
    /// Backend answered 2xx with a shape we could not extract text from.
    ParseFailure,
    Unknown,
}

/// Known backend error vocabularies, checked in order.
///
/// Matching is done on the lowercased body, so every needle is lowercase.
const VOCABULARY: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::InvalidCredential,
        &[
            "api_key_invalid",
            "key not valid",
            "invalid api key",
            "invalid_api_key",
            "incorrect api key",
            "invalid x-api-key",
            "authentication_error",
            "unauthenticated",
        ],
    ),
    (
        ErrorKind::QuotaExceeded,
        &[
            "insufficient_quota",
            "quota",
            "rate limit",
            "rate_limit",
            "resource_exhausted",
            "too many requests",
        ],
    ),
    (
        ErrorKind::PermissionDenied,
        &["permission_denied", "permission_error", "permission", "forbidden"],
    ),
    (
        ErrorKind::ModelUnavailable,
        &[
            "model_not_found",
            "model not found",
            "not_found_error",
            "not found",
            "does not exist",
            "deprecated",
        ],
    ),
    (
        ErrorKind::MalformedRequest,
        &[
            "invalid_request_error",
            "invalid_argument",
            "invalid_request",
            "bad request",
            "malformed",
        ],
    ),
    (
        ErrorKind::TransientNetwork,
        &[
            "overloaded",
            "timeout",
            "timed out",
            "internal",
            "server error",
            "unavailable",
        ],
    ),
];

impl ErrorKind {
    /// Classify a non-2xx backend reply.
    ///
    /// The body is checked against the known vocabularies first; the HTTP
    /// status decides only when nothing in the body is recognised.
    pub fn classify(status: u16, body: &str) -> Self {
        let lowered = body.to_lowercase();
        for (kind, needles) in VOCABULARY {
            if needles.iter().any(|n| lowered.contains(n)) {
                return *kind;
            }
        }
        Self::from_status(status)
    }

    /// Map an HTTP status code to a kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::InvalidCredential,
            402 | 429 => ErrorKind::QuotaExceeded,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::ModelUnavailable,
            400 | 413 | 422 => ErrorKind::MalformedRequest,
            408 | 500..=599 => ErrorKind::TransientNetwork,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether retrying the same request could help.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientNetwork)
    }

    /// Short remediation hint a presentation layer can show next to the error.
    pub fn remediation(self) -> &'static str {
        match self {
            ErrorKind::NotConfigured => {
                "Configure an API key or enable the local daemon or fallback mode."
            }
            ErrorKind::InvalidCredential => {
                "Check that the API key was copied completely, without surrounding whitespace, and is still active."
            }
            ErrorKind::QuotaExceeded => {
                "The request quota is exhausted. Wait a few minutes or switch to a local model."
            }
            ErrorKind::ModelUnavailable => {
                "The selected model is unavailable. Refresh the model list or pick another model."
            }
            ErrorKind::PermissionDenied => {
                "The account is not allowed to use this API or model in its current region."
            }
            ErrorKind::MalformedRequest => {
                "The backend rejected the request. Shorten the prompt or check the model parameters."
            }
            ErrorKind::TransientNetwork => {
                "The service could not be reached. Check the connection and try again later."
            }
            ErrorKind::ParseFailure => {
                "The backend replied in an unexpected format. Try again or pick another model."
            }
            ErrorKind::Unknown => "Unexpected error. Check the key, the connection and the service status.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotConfigured => "not configured",
            ErrorKind::InvalidCredential => "invalid credential",
            ErrorKind::QuotaExceeded => "quota exceeded",
            ErrorKind::ModelUnavailable => "model unavailable",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::MalformedRequest => "malformed request",
            ErrorKind::TransientNetwork => "network error",
            ErrorKind::ParseFailure => "unexpected response format",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}
