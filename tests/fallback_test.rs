//! Offline responder backed by a responses file.

use std::time::Duration;

use tempfile::TempDir;

use huginn::config::FallbackConfig;
use huginn::providers::{FallbackProvider, ResponseTable};
use huginn::{Provider, QueryRequest};

#[tokio::test]
async fn responses_file_extends_builtin_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("responses.json");
    std::fs::write(
        &path,
        r#"{"deployment": ["Ship it with a container image."], "greeting": ["Welcome back!"]}"#,
    )
    .unwrap();

    let provider = FallbackProvider::new(&FallbackConfig {
        responses_path: Some(path),
        ..FallbackConfig::default()
    });

    let response = provider
        .query(&QueryRequest::new("how does deployment work?"))
        .await;
    assert_eq!(response.content.as_deref(), Some("Ship it with a container image."));
    assert!(response.served_from_fallback);

    let response = provider.query(&QueryRequest::new("")).await;
    assert_eq!(response.content.as_deref(), Some("Welcome back!"));
}

#[tokio::test]
async fn unreadable_responses_file_uses_builtin_table() {
    let dir = TempDir::new().unwrap();
    let provider = FallbackProvider::new(&FallbackConfig {
        responses_path: Some(dir.path().join("missing.json")),
        ..FallbackConfig::default()
    });

    let response = provider.query(&QueryRequest::new("hello")).await;
    assert!(response.success);
    assert_eq!(response.model.as_deref(), Some("demo"));
}

#[test]
fn malformed_json_is_rejected() {
    let mut table = ResponseTable::builtin();
    assert!(table.merge_json("[1, 2").is_err());
}

#[tokio::test(start_paused = true)]
async fn configured_delay_is_applied() {
    let provider = FallbackProvider::new(&FallbackConfig {
        delay_ms: 800,
        ..FallbackConfig::default()
    });

    let start = tokio::time::Instant::now();
    provider.query(&QueryRequest::new("hello")).await;
    assert!(start.elapsed() >= Duration::from_millis(800));
}

#[test]
fn disabled_provider_is_not_configured() {
    let provider = FallbackProvider::new(&FallbackConfig {
        enabled: false,
        ..FallbackConfig::default()
    });
    assert!(!provider.is_configured());
}
