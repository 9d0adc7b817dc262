//! Local Ollama daemon provider.
//!
//! See: <https://github.com/ollama/ollama/blob/main/docs/api.md>
//!
//! Besides generation this exposes the two discovery calls the registry
//! uses: [`OllamaProvider::is_server_running`] and
//! [`OllamaProvider::list_installed_models`]. Neither ever fails; any error
//! reads as "not running" or "no models".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::Provider;
use super::{not_configured, parse_body, read_body, rejected, unparseable};
use crate::Result;
use crate::config::OllamaConfig;
use crate::error::ErrorKind;
use crate::types::{ProviderKind, QueryRequest, QueryResponse, Usage};

/// Client for a local Ollama daemon.
pub struct OllamaProvider {
    enabled: bool,
    endpoint: String,
    model: String,
    timeout: Duration,
    probe_timeout: Duration,
    http: Client,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig, http: Client) -> Self {
        Self {
            enabled: config.enabled,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            http,
        }
    }

    /// `.../api` derived from the generate endpoint.
    fn api_base(&self) -> String {
        let base = self.endpoint.replace("/api/generate", "");
        if base.ends_with("/api") {
            base
        } else {
            format!("{base}/api")
        }
    }

    fn version_url(&self) -> String {
        format!("{}/version", self.api_base())
    }

    fn tags_url(&self) -> String {
        if self.endpoint.ends_with("/generate") {
            self.endpoint.replace("/generate", "/tags")
        } else {
            format!("{}/tags", self.api_base())
        }
    }

    /// Whether the daemon answers its version endpoint within the probe timeout.
    pub async fn is_server_running(&self) -> bool {
        let result = self
            .http
            .get(self.version_url())
            .timeout(self.probe_timeout)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!(endpoint = %self.endpoint, "Ollama daemon is reachable");
                true
            }
            Ok(response) => {
                debug!(status = %response.status(), "Ollama version probe rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "Ollama daemon not reachable");
                false
            }
        }
    }

    /// Names of the models installed in the daemon. Empty on any failure.
    pub async fn list_installed_models(&self) -> Vec<String> {
        match self.fetch_tags().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "failed to list Ollama models");
                Vec::new()
            }
        }
    }

    async fn fetch_tags(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.tags_url())
            .timeout(self.timeout)
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Err(crate::HuginnError::Http(format!(
                "model listing returned {status}"
            )));
        }
        let tags: TagsResponse = parse_body(&body)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn build_request<'a>(&'a self, request: &'a QueryRequest) -> GenerateRequest<'a> {
        let history = request.windowed_history();
        let prompt = if history.is_empty() {
            request.prompt.clone()
        } else {
            let mut transcript: String = history.iter().map(|turn| format!("{turn}\n")).collect();
            transcript.push('\n');
            transcript.push_str(&request.prompt);
            transcript
        };
        GenerateRequest {
            model: &self.model,
            prompt,
            system: (!request.system_prompt.is_empty()).then_some(request.system_prompt.as_str()),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    fn daemon_rejected(&self, status: StatusCode, body: String) -> QueryResponse {
        match status {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => QueryResponse::failure(
                ErrorKind::ModelUnavailable,
                format!(
                    "Ollama could not serve model '{}' ({status}). Install it with `ollama pull {}`",
                    self.model, self.model
                ),
            )
            .with_detail(body)
            .with_provider(self.name()),
            _ => rejected(self.name(), status, body),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn is_configured(&self) -> bool {
        self.enabled && !self.endpoint.is_empty() && !self.model.is_empty()
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        if !self.is_configured() {
            return Ok(not_configured(self.name(), "endpoint or model missing, or provider disabled"));
        }

        debug!(model = %self.model, "sending generate request");
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&self.build_request(request))
            .send()
            .await?;

        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Ok(self.daemon_rejected(status, body));
        }

        let parsed: GenerateResponse = parse_body(&body)?;
        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(Usage::new(prompt.unwrap_or(0), completion.unwrap_or(0))),
        };
        let model = parsed.model.clone().unwrap_or_else(|| self.model.clone());
        match parsed.response {
            Some(text) => Ok(QueryResponse::success(text)
                .with_model(model)
                .with_usage(usage)
                .with_provider(self.name())),
            None => Ok(unparseable(self.name(), body)),
        }
    }

    async fn list_models(&self) -> Vec<String> {
        self.list_installed_models().await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}
