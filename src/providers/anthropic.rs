//! Anthropic messages provider.
//!
//! See: <https://docs.anthropic.com/en/api/messages>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::Provider;
use super::{not_configured, parse_body, read_body, rejected, unparseable};
use crate::Result;
use crate::config::ApiProviderConfig;
use crate::types::{ProviderKind, QueryRequest, QueryResponse, Role, Usage};

/// Default base URL for the Anthropic API
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const MODELS: &[&str] = &[
    "claude-3-haiku-20240307",
    "claude-3-sonnet-20240229",
    "claude-3-opus-20240229",
];

/// Client for the Anthropic messages endpoint.
pub struct AnthropicProvider {
    api_key: Option<String>,
    enabled: bool,
    base_url: String,
    model: String,
    timeout: Duration,
    http: Client,
}

impl AnthropicProvider {
    pub fn new(config: &ApiProviderConfig, http: Client) -> Self {
        Self {
            api_key: config.key().map(str::to_string),
            enabled: config.enabled,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            http,
        }
    }

    fn build_request<'a>(&'a self, request: &'a QueryRequest) -> MessagesRequest<'a> {
        let mut messages: Vec<Message<'a>> = request
            .windowed_history()
            .iter()
            .filter_map(|turn| {
                let role = match turn.role() {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Other => return None,
                };
                Some(Message {
                    role,
                    content: &turn.text,
                })
            })
            .collect();
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        MessagesRequest {
            model: &self.model,
            system: (!request.system_prompt.is_empty()).then_some(request.system_prompt.as_str()),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn is_configured(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let Some(api_key) = self.api_key.as_deref().filter(|_| self.enabled) else {
            return Ok(not_configured(self.name(), "API key missing or provider disabled"));
        };

        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, "sending messages request");
        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(self.timeout)
            .json(&self.build_request(request))
            .send()
            .await?;

        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Ok(rejected(self.name(), status, body));
        }

        let parsed: MessagesResponse = parse_body(&body)?;
        let usage = parsed
            .usage
            .as_ref()
            .map(|u| Usage::new(u.input_tokens, u.output_tokens));
        let model = parsed.model.clone().unwrap_or_else(|| self.model.clone());
        match parsed.into_text() {
            Some(text) => Ok(QueryResponse::success(text)
                .with_model(model)
                .with_usage(usage)
                .with_provider(self.name())),
            None => Ok(unparseable(self.name(), body)),
        }
    }

    async fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    /// Legacy text-completions shape.
    #[serde(default)]
    completion: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesResponse {
    /// First content block's text, else the legacy `completion` field.
    fn into_text(self) -> Option<String> {
        self.content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .or(self.completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_completion_is_accepted() {
        let parsed: MessagesResponse =
            serde_json::from_str(r#"{"completion":"old style"}"#).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("old style"));
    }

    #[test]
    fn content_block_preferred() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"new"}],"completion":"old"}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("new"));
    }

    #[test]
    fn system_prompt_sent_separately() {
        let provider =
            AnthropicProvider::new(&ApiProviderConfig::with_key("sk-ant-test"), Client::new());
        let request = QueryRequest::new("hi").system_prompt("be brief");
        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);

        let bare = serde_json::to_value(provider.build_request(&QueryRequest::new("hi"))).unwrap();
        assert!(bare.get("system").is_none());
    }
}
