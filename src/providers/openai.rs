//! OpenAI chat completions provider.
//!
//! See: <https://platform.openai.com/docs/api-reference/chat>

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

/// Default base URL for the OpenAI API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Models offered when the backend is not asked for a live listing.
pub const MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-4",
    "gpt-4-turbo",
    "gpt-3.5-turbo-0125",
    "gpt-4-vision-preview",
];

/// Client for the OpenAI chat completions endpoint.
pub struct OpenAiProvider {
    api_key: Option<String>,
    enabled: bool,
    base_url: String,
    model: String,
    timeout: Duration,
    http: Client,
}

impl OpenAiProvider {
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

    fn build_request<'a>(&'a self, request: &'a QueryRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system_prompt,
            });
        }
        for turn in request.windowed_history() {
            let role = match turn.role() {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Other => continue,
            };
            messages.push(ChatMessage {
                role,
                content: &turn.text,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "sending chat completion request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&self.build_request(request))
            .send()
            .await?;

        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Ok(rejected(self.name(), status, body));
        }

        let parsed: ChatCompletion = parse_body(&body)?;
        let usage = parsed
            .usage
            .as_ref()
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));
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
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatCompletion {
    /// Text of the first choice.
    fn into_text(self) -> Option<String> {
        self.choices.into_iter().next()?.message?.content
    }
}
