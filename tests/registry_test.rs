//! Provider selection, fall-through and listing.

use std::sync::Arc;

use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use huginn::config::{ApiProviderConfig, Config, OllamaConfig};
use huginn::{ProviderKind, ProviderRegistry, QueryRequest};

/// Config with every provider off except the fallback responder.
fn offline_config() -> Config {
    let mut config = Config::default();
    config.providers.ollama.enabled = false;
    config
}

fn registry(config: Config) -> ProviderRegistry {
    ProviderRegistry::with_client(Arc::new(config), Client::new())
}

async fn daemon(version_status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(version_status).set_body_json(json!({"version": "0.1"})))
        .mount(&server)
        .await;
    server
}

fn with_daemon(mut config: Config, server: &MockServer) -> Config {
    config.providers.ollama = OllamaConfig {
        endpoint: format!("{}/api/generate", server.uri()),
        ..OllamaConfig::default()
    };
    config
}

// ============================================================================
// Best available
// ============================================================================

#[tokio::test]
async fn nothing_configured_resolves_to_fallback() {
    let registry = registry(offline_config());
    let provider = registry.resolve("").await.unwrap();
    assert_eq!(provider.kind(), ProviderKind::Fallback);
}

#[tokio::test]
async fn unreachable_daemon_resolves_to_fallback() {
    let server = daemon(503).await;
    let registry = registry(with_daemon(Config::default(), &server));

    let provider = registry.resolve("").await.unwrap();
    assert_eq!(provider.kind(), ProviderKind::Fallback);

    let response = provider.query(&QueryRequest::new("hello")).await;
    assert!(response.success);
    assert!(response.served_from_fallback);
}

#[tokio::test]
async fn reachable_daemon_has_top_priority() {
    let server = daemon(200).await;
    let mut config = with_daemon(Config::default(), &server);
    config.providers.openai = ApiProviderConfig::with_key("sk-test");
    let registry = registry(config);

    let provider = registry.resolve("").await.unwrap();
    assert_eq!(provider.kind(), ProviderKind::Ollama);
}

#[tokio::test]
async fn cloud_providers_follow_priority_order() {
    let mut config = offline_config();
    config.providers.anthropic = ApiProviderConfig::with_key("sk-ant-test");
    config.providers.gemini = ApiProviderConfig::with_key("AIzaSyExample123");
    let registry = registry(config);

    let provider = registry.best_available().await.unwrap();
    assert_eq!(provider.kind(), ProviderKind::Gemini);
}

#[tokio::test]
async fn daemon_is_skipped_when_free_models_disabled() {
    let server = daemon(200).await;
    let mut config = with_daemon(Config::default(), &server);
    config.general.enable_free_models = false;
    let registry = registry(config);

    assert!(!registry.probe_local_daemon(true).await);
    let provider = registry.resolve("").await.unwrap();
    assert_eq!(provider.kind(), ProviderKind::Fallback);
}

#[tokio::test]
async fn nothing_at_all_resolves_to_none() {
    let mut config = offline_config();
    config.providers.fallback.enabled = false;
    let registry = registry(config);
    assert!(registry.resolve("").await.is_none());
}

// ============================================================================
// Explicit names
// ============================================================================

#[tokio::test]
async fn named_provider_resolves_by_alias() {
    let mut config = offline_config();
    config.providers.anthropic = ApiProviderConfig::with_key("sk-ant-test");
    let registry = registry(config);

    for name in ["Anthropic Claude", "anthropic", "claude"] {
        let provider = registry.resolve(name).await.unwrap();
        assert_eq!(provider.kind(), ProviderKind::Anthropic, "{name}");
    }
}

#[tokio::test]
async fn unconfigured_named_provider_falls_through() {
    let registry = registry(offline_config());
    let provider = registry.resolve("OpenAI").await.unwrap();
    assert_eq!(provider.kind(), ProviderKind::Fallback);
}

#[tokio::test]
async fn unknown_name_resolves_to_none() {
    let registry = registry(offline_config());
    assert!(registry.resolve("skynet").await.is_none());
}

#[tokio::test]
async fn resolved_providers_are_memoized() {
    let mut config = offline_config();
    config.providers.openai = ApiProviderConfig::with_key("sk-test");
    let registry = registry(config);

    let first = registry.resolve("openai").await.unwrap();
    let second = registry.resolve("OpenAI").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

// ============================================================================
// Probe
// ============================================================================

#[tokio::test]
async fn probe_is_cached_until_forced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    let registry = registry(with_daemon(Config::default(), &server));

    assert!(registry.probe_local_daemon(false).await);
    assert!(registry.probe_local_daemon(false).await);
    assert!(registry.probe_local_daemon(true).await);
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn list_available_orders_cloud_before_local() {
    let mut config = Config::default();
    config.providers.gemini = ApiProviderConfig::with_key("AIzaSyExample123");
    config.providers.openai = ApiProviderConfig::with_key("sk-test");
    let registry = registry(config);

    assert_eq!(
        registry.list_available(),
        ["Auto", "OpenAI", "Google Gemini", "Ollama", "Demo"]
    );
}

#[test]
fn list_available_without_free_models() {
    let mut config = Config::default();
    config.general.enable_free_models = false;
    config.providers.fallback.enabled = false;
    config.providers.anthropic = ApiProviderConfig::with_key("sk-ant-test");
    let registry = registry(config);

    assert_eq!(registry.list_available(), ["Anthropic Claude"]);
}

#[tokio::test]
async fn model_listing_is_memoized_until_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "llama3:latest"}]})),
        )
        .expect(2)
        .mount(&server)
        .await;
    let registry = registry(with_daemon(Config::default(), &server));

    let models = registry.available_models("Ollama", false).await;
    assert_eq!(models, ["llama3:latest"]);
    let again = registry.available_models("local", false).await;
    assert_eq!(again, models);
    registry.available_models("Ollama", true).await;
}

#[tokio::test]
async fn static_model_tables_and_unknown_names() {
    let registry = registry(offline_config());
    let models = registry.available_models("OpenAI", false).await;
    assert!(models.contains(&"gpt-3.5-turbo".to_string()));
    assert!(registry.available_models("Demo", false).await.is_empty());
    assert!(registry.available_models("nope", false).await.is_empty());
}
