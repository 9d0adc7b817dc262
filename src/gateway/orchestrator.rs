//! Huginn - the orchestrator facade
//!
//! Every query goes through one path:
//!
//! ```text
//! caller → resolve provider → cache lookup → provider (with retry) → cache store → caller
//! ```
//!
//! Only successful answers from network providers are stored; failures and
//! fallback answers never are.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::providers::{Provider, ProviderRegistry};
use crate::telemetry;
use crate::types::{ProviderKind, QueryRequest, QueryResponse, Turn, Usage};

/// Provider-routing orchestrator. Construct with [`Huginn::builder`].
pub struct Huginn {
    config: Arc<Config>,
    registry: ProviderRegistry,
    cache: Option<ResponseCache>,
}

impl Huginn {
    pub(crate) fn new(
        config: Arc<Config>,
        registry: ProviderRegistry,
        cache: Option<ResponseCache>,
    ) -> Self {
        Self {
            config,
            registry,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The response cache, unless caching is disabled.
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Provider name used when a call does not name one.
    fn default_provider(&self) -> &str {
        self.config.general.default_provider.as_deref().unwrap_or("")
    }

    /// Query the default provider without the cache.
    pub async fn query(&self, prompt: &str, history: &[Turn]) -> QueryResponse {
        self.query_with_provider(self.default_provider(), prompt, history, false, None)
            .await
    }

    /// Query the default provider, reading and writing the cache when
    /// `use_cache` is set. `system_prompt` overrides the configured one.
    pub async fn query_with_cache(
        &self,
        prompt: &str,
        history: &[Turn],
        use_cache: bool,
        system_prompt: Option<&str>,
    ) -> QueryResponse {
        self.query_with_provider(self.default_provider(), prompt, history, use_cache, system_prompt)
            .await
    }

    /// Query a named provider ("" or "auto" for best available).
    ///
    /// Never fails: an unresolvable provider yields a `NotConfigured`
    /// response.
    #[instrument(skip(self, prompt, history, system_prompt), fields(history_len = history.len()))]
    pub async fn query_with_provider(
        &self,
        provider_name: &str,
        prompt: &str,
        history: &[Turn],
        use_cache: bool,
        system_prompt: Option<&str>,
    ) -> QueryResponse {
        let start = Instant::now();
        let Some(provider) = self.registry.resolve(provider_name).await else {
            let mut response = QueryResponse::failure(
                ErrorKind::NotConfigured,
                "No AI service configured. Add an API key, start a local daemon or enable fallback mode.",
            );
            response.latency = Some(start.elapsed());
            return response;
        };

        let system_prompt = system_prompt.unwrap_or(&self.config.general.system_prompt);
        let cache = self.cache.as_ref().filter(|_| use_cache);

        if let Some(cache) = cache
            && let Some(content) = cache.lookup(provider.name(), prompt, system_prompt, history)
        {
            debug!(provider = provider.name(), "answered from cache");
            let mut response = QueryResponse::success(content).with_provider(provider.name());
            response.model = provider.model().map(str::to_string);
            response.served_from_cache = true;
            response.latency = Some(start.elapsed());
            return response;
        }

        let general = &self.config.general;
        let request = QueryRequest::new(prompt)
            .history(history.iter().cloned())
            .system_prompt(system_prompt)
            .temperature(general.temperature)
            .max_tokens(general.max_tokens)
            .history_window(general.max_history);

        let mut response = provider.query(&request).await;
        response.latency = Some(start.elapsed());
        if response.provider.is_none() {
            response.provider = Some(provider.name().to_string());
        }
        if provider.kind() == ProviderKind::Fallback {
            response.served_from_fallback = true;
        }
        Self::record_request(provider.as_ref(), start, &response);

        if let Some(cache) = cache
            && response.success
            && !response.served_from_fallback
            && let Some(content) = response.content.as_deref()
        {
            cache.store(provider.name(), prompt, system_prompt, history, content);
        }
        response
    }

    /// Provider names for a picker, "Auto" first when discovery is on.
    pub fn list_available(&self) -> Vec<String> {
        self.registry.list_available()
    }

    /// Probe the local daemon (once per process unless forced).
    pub async fn probe_local_daemon(&self, force: bool) -> bool {
        self.registry.probe_local_daemon(force).await
    }

    /// Models a provider can serve.
    pub async fn available_models(&self, provider_name: &str, force_refresh: bool) -> Vec<String> {
        self.registry
            .available_models(provider_name, force_refresh)
            .await
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Record request outcome metrics (counter + histogram + tokens).
    fn record_request(provider: &dyn Provider, start: Instant, response: &QueryResponse) {
        let status = if response.success { "ok" } else { "error" };
        let name = provider.name().to_owned();
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => name.clone(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => name.clone(),
        )
        .record(start.elapsed().as_secs_f64());
        if let Some(usage) = response.usage {
            Self::record_token_usage(name, usage);
        }
    }

    fn record_token_usage(provider: String, usage: Usage) {
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.clone(),
            "direction" => "prompt",
        )
        .increment(u64::from(usage.prompt_tokens));
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider,
            "direction" => "completion",
        )
        .increment(u64::from(usage.completion_tokens));
    }
}
