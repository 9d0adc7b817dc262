//! End-to-end query path through the `Huginn` facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use huginn::config::ApiProviderConfig;
use huginn::{
    ErrorKind, Huginn, Provider, ProviderKind, QueryRequest, QueryResponse, Result, RetryPolicy,
    Turn,
};

fn openai_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"content": text}}],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2}
    }))
}

/// Orchestrator with only OpenAI pointed at `server`.
fn openai_huginn(server: &MockServer) -> Huginn {
    let mut config = offline_config();
    config.providers.openai = ApiProviderConfig::with_key("sk-test").base_url(server.uri());
    Huginn::builder()
        .config(config)
        .retry_policy(RetryPolicy::disabled())
        .build()
        .unwrap()
}

/// Defaults with the local daemon and the fallback responder off.
fn offline_config() -> huginn::Config {
    let mut config = huginn::Config::default();
    config.providers.ollama.enabled = false;
    config.providers.fallback.enabled = false;
    config
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn second_identical_query_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(openai_reply("Use clap."))
        .expect(1)
        .mount(&server)
        .await;
    let huginn = openai_huginn(&server);
    let history = vec![Turn::user("I'm writing a CLI."), Turn::assistant("Great!")];

    let first = huginn
        .query_with_cache("How do I parse flags?", &history, true, None)
        .await;
    assert!(first.success);
    assert!(!first.served_from_cache);
    assert!(first.latency.is_some());

    let second = huginn
        .query_with_cache("How do I parse flags?", &history, true, None)
        .await;
    assert!(second.success);
    assert!(second.served_from_cache);
    assert_eq!(second.content, first.content);
    assert_eq!(second.provider.as_deref(), Some("OpenAI"));
    assert!(second.formatted().ends_with("_[Served from cache]_"));
}

#[tokio::test]
async fn cache_is_bypassed_when_not_requested() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_reply("fresh"))
        .expect(2)
        .mount(&server)
        .await;
    let huginn = openai_huginn(&server);

    huginn.query_with_cache("q", &[], true, None).await;
    let response = huginn.query_with_cache("q", &[], false, None).await;
    assert!(!response.served_from_cache);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit reached"))
        .expect(2)
        .mount(&server)
        .await;
    let huginn = openai_huginn(&server);

    for _ in 0..2 {
        let response = huginn.query_with_cache("q", &[], true, None).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::QuotaExceeded));
    }
    assert!(huginn.cache().unwrap().is_empty());
}

#[tokio::test]
async fn system_prompt_override_changes_the_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_reply("answer"))
        .expect(2)
        .mount(&server)
        .await;
    let huginn = openai_huginn(&server);

    huginn.query_with_cache("q", &[], true, Some("be terse")).await;
    let response = huginn.query_with_cache("q", &[], true, Some("be verbose")).await;
    assert!(!response.served_from_cache);
    assert_eq!(huginn.cache().unwrap().len(), 2);
}

#[tokio::test]
async fn clear_cache_forces_a_new_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_reply("answer"))
        .expect(2)
        .mount(&server)
        .await;
    let huginn = openai_huginn(&server);

    huginn.query_with_cache("q", &[], true, None).await;
    huginn.clear_cache();
    let response = huginn.query_with_cache("q", &[], true, None).await;
    assert!(!response.served_from_cache);
}

// ============================================================================
// Fallback and failures
// ============================================================================

#[tokio::test]
async fn fallback_answers_are_marked_and_never_cached() {
    let huginn = Huginn::builder().disable_local_daemon().build().unwrap();

    let response = huginn.query_with_cache("hello there", &[], true, None).await;
    assert!(response.success);
    assert!(response.served_from_fallback);
    assert_eq!(response.provider.as_deref(), Some("Demo"));
    assert!(response.formatted().ends_with("_[Generated in offline demo mode]_"));
    assert!(huginn.cache().unwrap().is_empty());
}

#[tokio::test]
async fn nothing_available_is_not_configured() {
    let huginn = Huginn::builder()
        .disable_local_daemon()
        .fallback(false)
        .build()
        .unwrap();

    let response = huginn.query("hello", &[]).await;
    assert!(!response.success);
    assert_eq!(response.error_kind(), Some(ErrorKind::NotConfigured));
    assert!(response.latency.is_some());
}

#[tokio::test]
async fn unknown_provider_name_is_not_configured() {
    let huginn = Huginn::builder().disable_local_daemon().build().unwrap();
    let response = huginn
        .query_with_provider("skynet", "hello", &[], false, None)
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::NotConfigured));
}

#[test]
fn invalid_configuration_fails_build() {
    let mut config = huginn::Config::default();
    config.general.temperature = 3.5;
    assert!(Huginn::builder().config(config).build().is_err());
}

// ============================================================================
// Registered providers
// ============================================================================

/// Provider that counts calls and echoes the prompt.
struct EchoProvider {
    calls: AtomicU32,
}

#[async_trait]
impl Provider for EchoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seen = request.windowed_history().len();
        Ok(QueryResponse::success(format!("{} ({seen} turns)", request.prompt)))
    }

    async fn list_models(&self) -> Vec<String> {
        Vec::new()
    }
}

#[tokio::test]
async fn registered_provider_receives_windowed_history() {
    let mut config = offline_config();
    config.general.max_history = 2;
    let huginn = Huginn::builder().config(config).build().unwrap();
    let echo = Arc::new(EchoProvider {
        calls: AtomicU32::new(0),
    });
    huginn
        .registry()
        .register(ProviderKind::Anthropic, echo.clone());

    let history: Vec<Turn> = (0..6).map(|i| Turn::user(format!("turn {i}"))).collect();
    let response = huginn
        .query_with_provider("claude", "ping", &history, false, None)
        .await;

    assert_eq!(response.content.as_deref(), Some("ping (2 turns)"));
    assert_eq!(response.provider.as_deref(), Some("Anthropic Claude"));
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}
