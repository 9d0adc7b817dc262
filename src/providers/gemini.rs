//! Google Gemini `generateContent` provider.
//!
//! See: <https://ai.google.dev/api/generate-content>
//!
//! Gemini has no system role on the v1 endpoint, so the system prompt is
//! primed as a user turn followed by a short model acknowledgement.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::Provider;
use super::{not_configured, parse_body, read_body, rejected, unparseable};
use crate::Result;
use crate::config::ApiProviderConfig;
use crate::error::ErrorKind;
use crate::types::{ProviderKind, QueryRequest, QueryResponse, Role, Usage};

/// Default base URL for the Generative Language API
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Keys shorter than this are rejected without a network call.
const MIN_KEY_LEN: usize = 10;

/// Offered when the live listing fails.
pub const FALLBACK_MODELS: &[&str] = &[
    "gemini-pro",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-pro-latest",
    "gemini-1.5-pro-preview",
];

/// Retired model names and their replacements.
const DEPRECATED_MODELS: &[(&str, &str)] = &[("gemini-pro-vision", "gemini-1.5-pro")];

const SYSTEM_ACK: &str = "Understood. I will follow these instructions.";

/// Clean up a pasted Gemini key.
///
/// Trims whitespace, strips surrounding quotes and pulls the key out of
/// pastes like `API key: AIza...`.
pub fn normalize_gemini_key(raw: &str) -> String {
    let key = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();

    let lowered = key.to_ascii_lowercase();
    if let Some(pos) = lowered.find("api key") {
        let rest = key[pos + "api key".len()..].trim_start();
        if let Some(rest) = rest.strip_prefix(':') {
            let extracted: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            if !extracted.is_empty() {
                return extracted;
            }
        }
    }
    key.to_string()
}

/// Canonical model id: no `models/` prefix, retired names replaced.
fn normalize_model(model: &str) -> String {
    let model = model.trim().trim_start_matches("models/");
    DEPRECATED_MODELS
        .iter()
        .find(|(old, _)| *old == model)
        .map(|(old, new)| {
            warn!(deprecated = old, replacement = new, "replacing retired Gemini model");
            new.to_string()
        })
        .unwrap_or_else(|| model.to_string())
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiProvider {
    api_key: Option<String>,
    enabled: bool,
    base_url: String,
    model: String,
    timeout: Duration,
    http: Client,
}

impl GeminiProvider {
    pub fn new(config: &ApiProviderConfig, http: Client) -> Self {
        Self {
            api_key: config.key().map(normalize_gemini_key),
            enabled: config.enabled,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: normalize_model(config.model.as_deref().unwrap_or(DEFAULT_MODEL)),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            http,
        }
    }

    fn build_request<'a>(&self, request: &'a QueryRequest) -> GenerateContentRequest<'a> {
        let mut contents = Vec::with_capacity(request.history.len() + 3);
        if !request.system_prompt.is_empty() {
            contents.push(Content::new("user", &request.system_prompt));
            contents.push(Content::new("model", SYSTEM_ACK));
        }
        for turn in request.windowed_history() {
            let role = match turn.role() {
                Role::User => "user",
                Role::Assistant => "model",
                Role::Other => continue,
            };
            contents.push(Content::new(role, &turn.text));
        }
        contents.push(Content::new("user", &request.prompt));

        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                top_k: 40,
                top_p: 0.95,
            },
            safety_settings: vec![
                SafetySetting {
                    category: "HARM_CATEGORY_HARASSMENT",
                    threshold: "BLOCK_ONLY_HIGH",
                },
                SafetySetting {
                    category: "HARM_CATEGORY_HATE_SPEECH",
                    threshold: "BLOCK_ONLY_HIGH",
                },
            ],
        }
    }

    fn usable_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|k| self.enabled && k.len() >= MIN_KEY_LEN)
    }

    async fn fetch_models(&self, api_key: &str) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Err(crate::HuginnError::Http(format!(
                "model listing returned {status}"
            )));
        }
        let listing: ModelList = parse_body(&body)?;
        Ok(listing
            .models
            .into_iter()
            .map(|m| match m.name.rsplit_once('/') {
                Some((_, short)) => short.to_string(),
                None => m.name,
            })
            .filter(|name| name.contains("gemini"))
            .collect())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn is_configured(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        if !self.is_configured() {
            return Ok(not_configured(self.name(), "API key missing or provider disabled"));
        }
        let Some(api_key) = self.usable_key() else {
            return Ok(QueryResponse::failure(
                ErrorKind::InvalidCredential,
                format!("Gemini API key is too short (expected at least {MIN_KEY_LEN} characters)"),
            )
            .with_provider(self.name()));
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(model = %self.model, "sending generateContent request");
        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&self.build_request(request))
            .send()
            .await?;

        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Ok(rejected(self.name(), status, body));
        }

        let parsed: GenerateContentResponse = parse_body(&body)?;
        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Ok(QueryResponse::failure(
                ErrorKind::PermissionDenied,
                format!("Request blocked by Gemini safety filters: {reason}"),
            )
            .with_detail(body)
            .with_provider(self.name()));
        }

        let usage = parsed
            .usage_metadata
            .as_ref()
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count));
        match parsed.into_text() {
            Some(text) => Ok(QueryResponse::success(text)
                .with_model(self.model.clone())
                .with_usage(usage)
                .with_provider(self.name())),
            None => Ok(unparseable(self.name(), body)),
        }
    }

    async fn list_models(&self) -> Vec<String> {
        let static_list = || FALLBACK_MODELS.iter().map(|m| m.to_string()).collect();
        let Some(api_key) = self.usable_key() else {
            return static_list();
        };
        match self.fetch_models(api_key).await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => static_list(),
            Err(e) => {
                warn!(error = %e, "failed to list Gemini models, using static list");
                static_list()
            }
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

impl<'a> Content<'a> {
    fn new(role: &'static str, text: &'a str) -> Self {
        Self {
            role,
            parts: [Part { text }],
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_k: u32,
    top_p: f32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate.
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Turn;

    #[test]
    fn normalize_key_strips_noise() {
        assert_eq!(normalize_gemini_key("  AIzaSyExample123  "), "AIzaSyExample123");
        assert_eq!(normalize_gemini_key("\"AIzaSyExample123\""), "AIzaSyExample123");
        assert_eq!(
            normalize_gemini_key("Your API key: AIzaSy-Example_123 (copied)"),
            "AIzaSy-Example_123"
        );
    }

    #[test]
    fn normalize_model_handles_prefix_and_retired_names() {
        assert_eq!(normalize_model("models/gemini-1.5-pro"), "gemini-1.5-pro");
        assert_eq!(normalize_model("gemini-pro-vision"), "gemini-1.5-pro");
        assert_eq!(normalize_model("gemini-1.5-flash"), "gemini-1.5-flash");
    }

    #[test]
    fn system_prompt_is_primed_as_turn_pair() {
        let provider = GeminiProvider::new(
            &ApiProviderConfig::with_key("AIzaSyExample123"),
            Client::new(),
        );
        let request = QueryRequest::new("hello")
            .system_prompt("be brief")
            .history(vec![Turn::assistant("earlier answer")]);
        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        let contents = body["contents"].as_array().unwrap();
        let roles: Vec<&str> = contents.iter().map(|c| c["role"].as_str().unwrap()).collect();
        assert_eq!(roles, ["user", "model", "model", "user"]);
        assert_eq!(contents[0]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 2);
    }
}
