//! Retry policy and provider decorator.
//!
//! [`RetryPolicy`] bounds how often a fallible operation is repeated and how
//! long to wait in between. [`RetryingProvider`] wraps a [`Provider`] so that
//! transport faults from [`Provider::try_query`] are retried; classified
//! backend rejections are values and pass straight through.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::traits::Provider;
use crate::telemetry;
use crate::types::{ProviderKind, QueryRequest, QueryResponse};
use crate::{HuginnError, Result};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// `delay * 2^retry`, capped at one minute.
    Exponential,
}

/// Bounded retry with a delay between attempts.
///
/// ```rust
/// # use huginn::{Backoff, RetryPolicy};
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .delay(Duration::from_millis(200))
///     .backoff(Backoff::Exponential);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1.5s.
    pub delay: Duration,
    /// Default: fixed.
    pub backoff: Backoff,
}

const MAX_BACKOFF: Duration = Duration::from_secs(60);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1500),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => self
                .delay
                .saturating_mul(2u32.saturating_pow(retry))
                .min(MAX_BACKOFF),
        }
    }

    /// Run `operation`, retrying failures that `is_retryable` accepts.
    ///
    /// The operation is invoked at most `max_retries + 1` times. When retries
    /// are exhausted, or the error does not qualify, the last error is
    /// returned. `is_retryable` is only consulted when a retry is still
    /// available.
    pub async fn execute_with_retry<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        mut is_retryable: P,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: FnMut(&E) -> bool,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries && is_retryable(&e) => {
                    tokio::time::sleep(self.delay_for_retry(retry)).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Execute a provider operation, retrying transient errors.
///
/// Counts each retry in [`telemetry::RETRIES_TOTAL`] and logs it.
pub(crate) async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    provider_name: &str,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    policy
        .execute_with_retry(operation, |e: &HuginnError| {
            if !e.is_transient() {
                return false;
            }
            attempt += 1;
            metrics::counter!(telemetry::RETRIES_TOTAL,
                "provider" => provider_name.to_owned(),
            )
            .increment(1);
            warn!(
                provider = provider_name,
                attempt,
                max_retries = policy.max_retries,
                error = %e,
                "retrying after transient error"
            );
            true
        })
        .await
}

/// Decorator that retries transport faults of the wrapped provider.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    fn model(&self) -> Option<&str> {
        self.inner.model()
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        with_retry(&self.policy, self.inner.name(), || self.inner.try_query(request)).await
    }

    async fn list_models(&self) -> Vec<String> {
        self.inner.list_models().await
    }
}
