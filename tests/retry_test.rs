use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use huginn::providers::RetryingProvider;
use huginn::{
    ErrorKind, HuginnError, Provider, ProviderKind, QueryRequest, QueryResponse, Result,
    RetryPolicy,
};

/// Mock provider that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> HuginnError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> HuginnError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Provider for FailThenSucceed {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn try_query(&self, _request: &QueryRequest) -> Result<QueryResponse> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(QueryResponse::success("ok"))
    }

    async fn list_models(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Mock provider whose backend always rejects the key.
struct RejectingProvider {
    total_calls: AtomicU32,
}

#[async_trait]
impl Provider for RejectingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn try_query(&self, _request: &QueryRequest) -> Result<QueryResponse> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Ok(QueryResponse::failure(ErrorKind::InvalidCredential, "bad key"))
    }

    async fn list_models(&self) -> Vec<String> {
        Vec::new()
    }
}

fn timeout() -> HuginnError {
    HuginnError::Timeout("operation timed out".into())
}

#[tokio::test(start_paused = true)]
async fn retries_on_transient_error_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, timeout));
    let provider = RetryingProvider::new(inner.clone(), RetryPolicy::new());

    let response = provider.query(&QueryRequest::new("hi")).await;

    assert!(response.success);
    assert_eq!(inner.call_count(), 3); // 2 failures + 1 success
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let inner = Arc::new(FailThenSucceed::new(10, || {
        HuginnError::Http("connection reset".into())
    }));
    let provider = RetryingProvider::new(inner.clone(), RetryPolicy::new().max_retries(3));

    let response = provider.query(&QueryRequest::new("hi")).await;

    assert!(!response.success);
    assert_eq!(response.error_kind(), Some(ErrorKind::TransientNetwork));
    assert_eq!(inner.call_count(), 4); // first attempt + 3 retries
}

#[tokio::test(start_paused = true)]
async fn waits_configured_delay_between_attempts() {
    let inner = Arc::new(FailThenSucceed::new(2, timeout));
    let provider = RetryingProvider::new(
        inner.clone(),
        RetryPolicy::new().delay(Duration::from_millis(1500)),
    );

    let start = tokio::time::Instant::now();
    provider.query(&QueryRequest::new("hi")).await;
    assert!(start.elapsed() >= Duration::from_millis(3000));
}

#[tokio::test]
async fn does_not_retry_configuration_errors() {
    let inner = Arc::new(FailThenSucceed::new(1, || HuginnError::NoProvider));
    let provider = RetryingProvider::new(inner.clone(), RetryPolicy::new());

    let response = provider.query(&QueryRequest::new("hi")).await;

    assert!(!response.success);
    assert_eq!(response.error_kind(), Some(ErrorKind::NotConfigured));
    assert_eq!(inner.call_count(), 1); // no retry
}

#[tokio::test]
async fn classified_rejections_pass_through_once() {
    let inner = Arc::new(RejectingProvider {
        total_calls: AtomicU32::new(0),
    });
    let provider = RetryingProvider::new(inner.clone(), RetryPolicy::new());

    let response = provider.query(&QueryRequest::new("hi")).await;

    assert_eq!(response.error_kind(), Some(ErrorKind::InvalidCredential));
    assert_eq!(inner.total_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn disabled_policy_no_retry() {
    let inner = Arc::new(FailThenSucceed::new(1, timeout));
    let provider = RetryingProvider::new(inner.clone(), RetryPolicy::disabled());

    let response = provider.query(&QueryRequest::new("hi")).await;

    assert!(!response.success);
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn execute_with_retry_is_generic_over_errors() {
    let policy = RetryPolicy::new().max_retries(2);
    let mut calls = 0;
    let result: std::result::Result<(), &str> = policy
        .execute_with_retry(
            || {
                calls += 1;
                async { Err("still failing") }
            },
            |_| true,
        )
        .await;

    assert_eq!(result, Err("still failing"));
    assert_eq!(calls, 3);
}

#[test]
fn decorator_delegates_identity() {
    let inner = Arc::new(FailThenSucceed::new(0, timeout));
    let provider = RetryingProvider::new(inner, RetryPolicy::disabled());
    assert_eq!(provider.kind(), ProviderKind::OpenAi);
    assert_eq!(provider.name(), "OpenAI");
    assert!(provider.is_configured());
}
