//! Backend providers.
//!
//! One module per backend, each implementing [`Provider`]. The
//! [`ProviderRegistry`] builds, memoizes and selects them; the
//! [`RetryingProvider`] decorator adds transport-level retry.

pub mod anthropic;
pub mod fallback;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod retry;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use fallback::{FallbackProvider, ResponseTable};
pub use gemini::{GeminiProvider, normalize_gemini_key};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
pub use retry::{Backoff, RetryPolicy, RetryingProvider};
pub use traits::Provider;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::error::ErrorKind;
use crate::types::QueryResponse;

/// Read a reply as `(status, body)`.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<(StatusCode, String)> {
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

/// Parse a 2xx body. Syntax errors are raised so the retry policy sees them.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

/// Failure response for a non-2xx reply, classified from status and body.
pub(crate) fn rejected(provider: &str, status: StatusCode, body: String) -> QueryResponse {
    let kind = ErrorKind::classify(status.as_u16(), &body);
    QueryResponse::failure(kind, format!("{provider} API error ({status}): {kind}"))
        .with_detail(body)
        .with_provider(provider)
}

/// Failure response for a 2xx reply without extractable text.
pub(crate) fn unparseable(provider: &str, body: String) -> QueryResponse {
    QueryResponse::failure(
        ErrorKind::ParseFailure,
        format!("Could not extract content from {provider} response"),
    )
    .with_detail(body)
    .with_provider(provider)
}

/// Failure response for a provider missing its key or turned off.
pub(crate) fn not_configured(provider: &str, what: &str) -> QueryResponse {
    QueryResponse::failure(
        ErrorKind::NotConfigured,
        format!("{provider} is not configured: {what}"),
    )
    .with_provider(provider)
}
