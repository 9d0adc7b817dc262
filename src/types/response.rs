//! Query response and provenance

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Token usage reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Why a query failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Raw backend body, when there was one.
    pub detail: Option<String>,
}

/// Outcome of a query.
///
/// Failures are values: `success == false` always carries an [`QueryError`],
/// and `success == true` always carries content.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub content: Option<String>,
    pub success: bool,
    pub error: Option<QueryError>,
    pub served_from_cache: bool,
    pub served_from_fallback: bool,
    /// Wall time of the call, set by the orchestrator.
    pub latency: Option<Duration>,
    pub usage: Option<Usage>,
    pub model: Option<String>,
    /// Display name of the provider that answered.
    pub provider: Option<String>,
}

impl QueryResponse {
    /// A successful response carrying `content`.
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            success: true,
            error: None,
            served_from_cache: false,
            served_from_fallback: false,
            latency: None,
            usage: None,
            model: None,
            provider: None,
        }
    }

    /// A failed response of the given kind.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            content: None,
            success: false,
            error: Some(QueryError {
                kind,
                message: message.into(),
                detail: None,
            }),
            served_from_cache: false,
            served_from_fallback: false,
            latency: None,
            usage: None,
            model: None,
            provider: None,
        }
    }

    /// Attach the raw backend body to a failure.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.detail = Some(detail.into());
        }
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn from_fallback(mut self) -> Self {
        self.served_from_fallback = true;
        self
    }

    /// Kind of failure, `None` on success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Content with a provenance note appended for fallback or cached answers.
    ///
    /// Failures are returned as their error message, without a note.
    pub fn formatted(&self) -> String {
        if !self.success {
            return self
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default();
        }
        let content = self.content.as_deref().unwrap_or_default();
        if self.served_from_fallback {
            format!("{content}\n\n_[Generated in offline demo mode]_")
        } else if self.served_from_cache {
            format!("{content}\n\n_[Served from cache]_")
        } else {
            content.to_string()
        }
    }
}
