//! Provider trait
//!
//! Every backend implements [`Provider`]. The contract is error-as-value:
//! ordinary failures (bad key, quota, unexpected JSON) come back as a
//! [`QueryResponse`] with `success == false`, never as a raised error.
//!
//! Providers report transport faults through [`Provider::try_query`] so the
//! [`RetryingProvider`](super::RetryingProvider) decorator can retry them;
//! [`Provider::query`] folds whatever is left into a response.

use async_trait::async_trait;

use crate::Result;
use crate::types::{ProviderKind, QueryRequest, QueryResponse};

#[async_trait]
pub trait Provider: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Provider display name (e.g. "Google Gemini").
    fn name(&self) -> &str {
        self.kind().display_name()
    }

    /// Whether the provider has what it needs to make a call.
    ///
    /// Pure: inspects configuration only, never performs I/O.
    fn is_configured(&self) -> bool;

    /// Model identifier requests are sent to, if the backend has one.
    fn model(&self) -> Option<&str> {
        None
    }

    /// Perform the call, raising only transport-level failures.
    ///
    /// Classified backend rejections are returned as `Ok` failure responses
    /// so they are never retried.
    async fn try_query(&self, request: &QueryRequest) -> Result<QueryResponse>;

    /// Perform the call. Never raises.
    async fn query(&self, request: &QueryRequest) -> QueryResponse {
        match self.try_query(request).await {
            Ok(response) => response,
            Err(e) => QueryResponse::failure(e.kind(), format!("{} request failed: {e}", self.name()))
                .with_provider(self.name()),
        }
    }

    /// Models this provider can serve. Never raises; live listings fall
    /// back to a static table or an empty list.
    async fn list_models(&self) -> Vec<String>;
}
