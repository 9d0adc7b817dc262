//! Builder for configuring orchestrator instances

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;

use super::Huginn;
use crate::Result;
use crate::cache::ResponseCache;
use crate::config::{ApiProviderConfig, Config};
use crate::providers::{ProviderRegistry, RetryPolicy};

impl Huginn {
    /// Create a new builder for configuring the orchestrator.
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }
}

/// Builder for configuring [`Huginn`] instances.
///
/// Starts from [`Config::default`]; individual setters adjust it, and
/// [`HuginnBuilder::config`] replaces it wholesale.
pub struct HuginnBuilder {
    config: Config,
    http: Option<Client>,
    retry: Option<RetryPolicy>,
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            http: None,
            retry: None,
        }
    }

    /// Use a complete configuration (e.g. from [`Config::load`]).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Configure OpenAI with an API key.
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.config.providers.openai = ApiProviderConfig::with_key(api_key);
        self
    }

    /// Configure Gemini with an API key.
    pub fn gemini(mut self, api_key: impl Into<String>) -> Self {
        self.config.providers.gemini = ApiProviderConfig::with_key(api_key);
        self
    }

    /// Configure Anthropic with an API key.
    pub fn anthropic(mut self, api_key: impl Into<String>) -> Self {
        self.config.providers.anthropic = ApiProviderConfig::with_key(api_key);
        self
    }

    /// Point the local daemon at a custom generate endpoint.
    pub fn ollama(mut self, endpoint: impl Into<String>) -> Self {
        self.config.providers.ollama.enabled = true;
        self.config.providers.ollama.endpoint = endpoint.into();
        self
    }

    /// Never use the local daemon.
    pub fn disable_local_daemon(mut self) -> Self {
        self.config.providers.ollama.enabled = false;
        self
    }

    /// Enable or disable the offline fallback responder.
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.config.providers.fallback.enabled = enabled;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.general.system_prompt = system_prompt.into();
        self
    }

    /// Persist the response cache to `path`.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache.enabled = true;
        self.config.cache.path = Some(path.into());
        self
    }

    /// Turn the response cache off entirely.
    pub fn disable_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    /// Override the retry policy from the configuration.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Share an existing HTTP client.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Validate the configuration and build the orchestrator.
    pub fn build(self) -> Result<Huginn> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let mut registry = match self.http {
            Some(client) => ProviderRegistry::with_client(config.clone(), client),
            None => ProviderRegistry::new(config.clone())?,
        };
        if let Some(policy) = self.retry {
            registry = registry.with_retry_policy(policy);
        }

        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::new(&config.cache));

        Ok(Huginn::new(config, registry, cache))
    }
}

impl Default for HuginnBuilder {
    fn default() -> Self {
        Self::new()
    }
}
