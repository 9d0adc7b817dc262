//! Provider registry and selection.
//!
//! The `ProviderRegistry` owns every provider instance. Providers are built
//! lazily from configuration, memoized on first successful construction and
//! reused for the rest of the process.
//!
//! # Selection
//!
//! An explicit name resolves to that provider when it is configured. An
//! empty name (or "auto") picks the first usable provider in priority order:
//!
//! ```text
//!   Ollama (enabled and probed reachable)
//!     → OpenAI (key present)
//!       → Gemini (key present)
//!         → Anthropic (key present)
//!           → Fallback (enabled)
//!             → none
//! ```
//!
//! A named provider that is not configured does not fail outright; the
//! registry falls through to the local daemon if it is reachable, then to
//! the fallback responder if enabled.
//!
//! # Retry Wrapping
//!
//! Network providers are wrapped in a [`RetryingProvider`] when they are
//! memoized, so every query through the registry retries transport faults.
//!
//! # Availability
//!
//! The local daemon is probed at most once per process unless a forced
//! probe is requested; the result feeds both explicit and best-available
//! selection. Cloud providers are never probed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use super::anthropic::AnthropicProvider;
use super::fallback::FallbackProvider;
use super::gemini::GeminiProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::retry::{RetryPolicy, RetryingProvider};
use super::traits::Provider;
use crate::cache::ModelListCache;
use crate::config::Config;
use crate::telemetry;
use crate::types::ProviderKind;
use crate::{HuginnError, Result};

/// Entry listed ahead of concrete providers when discovery is enabled.
pub const AUTO_ENTRY: &str = "Auto";

/// Order in which [`ProviderRegistry::list_available`] reports providers.
const LISTING_ORDER: [ProviderKind; 5] = [
    ProviderKind::OpenAi,
    ProviderKind::Gemini,
    ProviderKind::Anthropic,
    ProviderKind::Ollama,
    ProviderKind::Fallback,
];

/// Builds, memoizes and selects providers.
pub struct ProviderRegistry {
    config: Arc<Config>,
    http: Client,
    retry: RetryPolicy,
    instances: Mutex<HashMap<ProviderKind, Arc<dyn Provider>>>,
    local_daemon: Arc<OllamaProvider>,
    /// Last probe result; `None` until the first probe.
    local_daemon_state: tokio::sync::Mutex<Option<bool>>,
    models: ModelListCache,
}

impl ProviderRegistry {
    /// Create a registry with its own HTTP client.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("huginn/{}", crate::PKG_VERSION))
            .build()
            .map_err(|e| HuginnError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(config, http))
    }

    /// Create a registry that shares an existing HTTP client.
    pub fn with_client(config: Arc<Config>, http: Client) -> Self {
        let local_daemon = Arc::new(OllamaProvider::new(&config.providers.ollama, http.clone()));
        Self {
            retry: config.retry.policy(),
            config,
            http,
            instances: Mutex::new(HashMap::new()),
            local_daemon,
            local_daemon_state: tokio::sync::Mutex::new(None),
            models: ModelListCache::new(),
        }
    }

    /// Override the retry policy applied to providers memoized from now on.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The local daemon client used for discovery.
    pub fn local_daemon(&self) -> &OllamaProvider {
        &self.local_daemon
    }

    /// Install a provider instance for `kind`, replacing any memoized one.
    ///
    /// The instance is used as-is (no retry wrapping).
    pub fn register(&self, kind: ProviderKind, provider: Arc<dyn Provider>) {
        self.lock_instances().insert(kind, provider);
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<ProviderKind, Arc<dyn Provider>>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn memoized(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.lock_instances().get(&kind).cloned()
    }

    /// Build a fresh, unwrapped instance for `kind`.
    fn construct(&self, kind: ProviderKind) -> Arc<dyn Provider> {
        let providers = &self.config.providers;
        match kind {
            ProviderKind::Ollama => self.local_daemon.clone(),
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(&providers.openai, self.http.clone())),
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(&providers.gemini, self.http.clone())),
            ProviderKind::Anthropic => {
                Arc::new(AnthropicProvider::new(&providers.anthropic, self.http.clone()))
            }
            ProviderKind::Fallback => Arc::new(FallbackProvider::new(&providers.fallback)),
        }
    }

    /// Memoize `provider` unless another task got there first.
    fn memoize(&self, kind: ProviderKind, provider: Arc<dyn Provider>) -> Arc<dyn Provider> {
        let provider: Arc<dyn Provider> = match kind {
            ProviderKind::Fallback => provider,
            _ => Arc::new(RetryingProvider::new(provider, self.retry.clone())),
        };
        self.lock_instances()
            .entry(kind)
            .or_insert(provider)
            .clone()
    }

    fn local_daemon_allowed(&self) -> bool {
        self.config.general.enable_free_models && self.local_daemon.is_configured()
    }

    /// Probe the local daemon, once per process unless `force` is set.
    ///
    /// Returns `false` without any network call when the daemon is disabled.
    #[instrument(skip(self))]
    pub async fn probe_local_daemon(&self, force: bool) -> bool {
        let mut state = self.local_daemon_state.lock().await;
        if !force && let Some(available) = *state {
            return available;
        }
        let available = self.local_daemon_allowed() && self.local_daemon.is_server_running().await;
        info!(available, "probed local daemon");
        *state = Some(available);
        available
    }

    /// Whether `kind` can serve queries right now, probing the local daemon
    /// if needed. Returns the instance to memoize.
    async fn usable(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        if kind == ProviderKind::Ollama {
            return (self.local_daemon_allowed() && self.probe_local_daemon(false).await)
                .then(|| self.construct(kind));
        }
        let provider = self.construct(kind);
        provider.is_configured().then_some(provider)
    }

    /// Resolve a provider by name. Empty or "auto" picks the best available.
    ///
    /// Returns `None` for unknown names, or when nothing at all is usable.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> Option<Arc<dyn Provider>> {
        if ProviderKind::is_auto(name) {
            return self.best_available().await;
        }
        match ProviderKind::from_name(name) {
            Some(kind) => self.resolve_kind(kind).await,
            None => {
                warn!(name, "unknown provider name");
                None
            }
        }
    }

    /// Resolve a specific provider, falling through to the local daemon or
    /// the fallback responder when it is not configured.
    pub async fn resolve_kind(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        if let Some(provider) = self.memoized(kind) {
            return Some(provider);
        }
        if let Some(provider) = self.usable(kind).await {
            return Some(self.memoize(kind, provider));
        }

        let secondary = self.secondary(kind).await;
        match &secondary {
            Some(provider) => {
                warn!(requested = %kind, selected = provider.name(), "provider not configured, using fallback");
                metrics::counter!(telemetry::FALLBACK_TOTAL,
                    "requested" => kind.display_name(),
                    "selected" => provider.kind().display_name(),
                )
                .increment(1);
            }
            None => warn!(requested = %kind, "provider not configured and no fallback available"),
        }
        secondary
    }

    /// Local daemon if reachable, else the fallback responder if enabled.
    async fn secondary(&self, requested: ProviderKind) -> Option<Arc<dyn Provider>> {
        for kind in [ProviderKind::Ollama, ProviderKind::Fallback] {
            if kind == requested {
                continue;
            }
            if let Some(provider) = self.memoized(kind) {
                return Some(provider);
            }
            if let Some(provider) = self.usable(kind).await {
                return Some(self.memoize(kind, provider));
            }
        }
        None
    }

    /// First usable provider in priority order.
    #[instrument(skip(self))]
    pub async fn best_available(&self) -> Option<Arc<dyn Provider>> {
        for kind in ProviderKind::ALL {
            if let Some(provider) = self.memoized(kind) {
                debug!(provider = provider.name(), "selected memoized provider");
                return Some(provider);
            }
            if let Some(provider) = self.usable(kind).await {
                debug!(provider = provider.name(), "selected provider");
                return Some(self.memoize(kind, provider));
            }
        }
        warn!("no provider available");
        None
    }

    /// Names of every configured provider, with "Auto" first when free and
    /// local discovery is enabled. Performs no I/O.
    pub fn list_available(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.config.general.enable_free_models {
            names.push(AUTO_ENTRY.to_string());
        }
        for kind in LISTING_ORDER {
            let configured = match self.memoized(kind) {
                Some(provider) => provider.is_configured(),
                None if kind == ProviderKind::Ollama => self.local_daemon_allowed(),
                None if kind == ProviderKind::Fallback => self.config.providers.fallback.enabled,
                None => self.construct(kind).is_configured(),
            };
            if configured {
                names.push(kind.display_name().to_string());
            }
        }
        names
    }

    /// Models a provider can serve. Live listings are memoized; pass
    /// `force_refresh` to ask the backend again. Unknown names list nothing.
    #[instrument(skip(self))]
    pub async fn available_models(&self, name: &str, force_refresh: bool) -> Vec<String> {
        let Some(kind) = ProviderKind::from_name(name) else {
            return Vec::new();
        };
        if !force_refresh && let Some(models) = self.models.get(kind) {
            return models;
        }
        let provider = self.memoized(kind).unwrap_or_else(|| self.construct(kind));
        let models = provider.list_models().await;
        self.models.insert(kind, models.clone());
        models
    }
}
