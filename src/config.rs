//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.huginn/config.toml` (user)
//! 3. built-in defaults
//!
//! API keys resolve per provider as: explicit `api_key` in the config >
//! environment variable > `~/.huginn/secrets.toml` (must be 0600) > none.
//! Environment and secrets file are consulted only with
//! `general.auto_detect_keys` set.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::providers::{Backoff, RetryPolicy};
use crate::types::{DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderKind};
use crate::{HuginnError, Result};

/// Directory under `$HOME` holding config, secrets and persisted state.
const HOME_DIR_NAME: &str = ".huginn";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Generation parameters and discovery switches.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Trailing history turns forwarded to backends.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Provider used when a caller does not name one. Empty or "auto" means
    /// best-available selection.
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Allow local and offline providers (and list the "Auto" entry).
    #[serde(default = "default_true")]
    pub enable_free_models: bool,
    /// Look up API keys in the environment and the secrets file.
    #[serde(default = "default_true")]
    pub auto_detect_keys: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_history: default_max_history(),
            default_provider: None,
            enable_free_models: true,
            auto_detect_keys: true,
        }
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant for software developers. Answer concisely and include code where it helps.".to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_max_history() -> usize {
    DEFAULT_HISTORY_WINDOW
}

fn default_true() -> bool {
    true
}

/// Per-provider configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ApiProviderConfig,
    #[serde(default)]
    pub gemini: ApiProviderConfig,
    #[serde(default)]
    pub anthropic: ApiProviderConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

/// Cloud API provider configuration.
///
/// Unset fields fall back to the provider's own defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ApiProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            model: None,
            timeout_secs: None,
        }
    }
}

impl ApiProviderConfig {
    /// Configuration with an explicit key.
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Non-empty API key, if any.
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

/// Local Ollama daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Generation endpoint (default: http://localhost:11434/api/generate).
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,
    /// Timeout of the reachability probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_ollama_endpoint(),
            model: default_ollama_model(),
            timeout_secs: default_ollama_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

fn default_ollama_timeout() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    3
}

/// Offline canned responder configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON table of extra responses merged into the built-in one.
    #[serde(default)]
    pub responses_path: Option<PathBuf>,
    /// Simulated thinking time before answering.
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            responses_path: None,
            delay_ms: 0,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Backing file. Without one the cache lives in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            ttl_hours: default_ttl_hours(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }
}

fn default_ttl_hours() -> u64 {
    48
}

fn default_cache_max_entries() -> usize {
    1000
}

/// Retry configuration for transport faults.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_retry_delay_ms(),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .max_retries(self.max_retries)
            .delay(Duration::from_millis(self.delay_ms))
            .backoff(self.backoff)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1500
}

/// Chat history file configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_history")]
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: default_max_history(),
        }
    }
}

/// Secrets file (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub openai: Option<ApiKeySecret>,
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
    #[serde(default)]
    pub anthropic: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider → environment variables, first match wins.
const PROVIDER_ENV_VARS: &[(ProviderKind, &[&str])] = &[
    (ProviderKind::OpenAi, &["OPENAI_API_KEY"]),
    (ProviderKind::Gemini, &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    (ProviderKind::Anthropic, &["ANTHROPIC_API_KEY"]),
];

fn huginn_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(HOME_DIR_NAME))
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Unset cache and history paths default to files under `~/.huginn`.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        if let Some(dir) = huginn_dir() {
            config
                .cache
                .path
                .get_or_insert_with(|| dir.join("response_cache.json"));
            config
                .history
                .path
                .get_or_insert_with(|| dir.join("chat_history.json"));
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a single TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Ok(huginn_dir()
            .map(|dir| dir.join("config.toml"))
            .filter(|path| path.exists()))
    }

    /// Reject values no provider could work with.
    pub fn validate(&self) -> Result<()> {
        let general = &self.general;
        if !(0.0..=2.0).contains(&general.temperature) {
            return Err(HuginnError::Configuration(format!(
                "general.temperature must be within 0..=2, got {}",
                general.temperature
            )));
        }
        if general.max_tokens == 0 {
            return Err(HuginnError::Configuration(
                "general.max_tokens must be at least 1".to_string(),
            ));
        }
        if general.max_history == 0 {
            return Err(HuginnError::Configuration(
                "general.max_history must be at least 1".to_string(),
            ));
        }
        if let Some(name) = general.default_provider.as_deref()
            && !ProviderKind::is_auto(name)
        {
            name.parse::<ProviderKind>()?;
        }
        if self.cache.max_entries == 0 {
            return Err(HuginnError::Configuration(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        if self.history.max_entries == 0 {
            return Err(HuginnError::Configuration(
                "history.max_entries must be at least 1".to_string(),
            ));
        }

        let urls = [
            ("providers.openai.base_url", self.providers.openai.base_url.as_deref()),
            ("providers.gemini.base_url", self.providers.gemini.base_url.as_deref()),
            ("providers.anthropic.base_url", self.providers.anthropic.base_url.as_deref()),
            ("providers.ollama.endpoint", Some(self.providers.ollama.endpoint.as_str())),
        ];
        for (field, url) in urls {
            if let Some(url) = url {
                reqwest::Url::parse(url).map_err(|e| {
                    HuginnError::Configuration(format!("{field} is not a valid URL ({url}): {e}"))
                })?;
            }
        }
        Ok(())
    }

    /// Mutable access to a cloud provider's section.
    pub fn api_provider_mut(&mut self, kind: ProviderKind) -> Option<&mut ApiProviderConfig> {
        match kind {
            ProviderKind::OpenAi => Some(&mut self.providers.openai),
            ProviderKind::Gemini => Some(&mut self.providers.gemini),
            ProviderKind::Anthropic => Some(&mut self.providers.anthropic),
            ProviderKind::Ollama | ProviderKind::Fallback => None,
        }
    }

    /// Fill missing API keys from the environment and the secrets file.
    ///
    /// `env` looks up a variable by name; pass `|v| std::env::var(v).ok()`
    /// for the process environment. Explicit keys are never replaced, and
    /// nothing happens unless `general.auto_detect_keys` is set.
    pub fn resolve_api_keys<F>(&mut self, secrets: &Secrets, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.general.auto_detect_keys {
            return;
        }
        for (kind, vars) in PROVIDER_ENV_VARS {
            let from_file = secrets.api_key(*kind);
            let Some(section) = self.api_provider_mut(*kind) else {
                continue;
            };
            if section.key().is_some() {
                continue;
            }
            let detected = vars
                .iter()
                .filter_map(|var| env(var))
                .find(|key| !key.trim().is_empty())
                .or(from_file);
            if detected.is_some() {
                section.api_key = detected;
            }
        }
    }
}

impl Secrets {
    /// Load `~/.huginn/secrets.toml` with a permission check.
    ///
    /// Returns empty secrets if no file exists.
    pub fn load() -> Result<Self> {
        match huginn_dir().map(|dir| dir.join("secrets.toml")) {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Secrets::default()),
        }
    }

    /// Load a secrets file, rejecting group- or world-readable files.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(HuginnError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key stored for a provider, if any.
    pub fn api_key(&self, kind: ProviderKind) -> Option<String> {
        match kind {
            ProviderKind::OpenAi => self.openai.as_ref(),
            ProviderKind::Gemini => self.gemini.as_ref(),
            ProviderKind::Anthropic => self.anthropic.as_ref(),
            ProviderKind::Ollama | ProviderKind::Fallback => None,
        }
        .map(|s| s.api_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.general.temperature, 0.7);
        assert_eq!(config.general.max_tokens, 4096);
        assert_eq!(config.general.max_history, 50);
        assert!(config.general.enable_free_models);
        assert!(config.providers.fallback.enabled);
        assert_eq!(config.providers.ollama.probe_timeout_secs, 3);
        assert_eq!(config.cache.ttl(), Duration::from_secs(48 * 3600));
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_config_keeps_defaults() {
        let toml = r#"
            [general]
            temperature = 0.2

            [providers.ollama]
            model = "mistral"

            [retry]
            backoff = "exponential"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.general.temperature, 0.2);
        assert_eq!(config.general.max_tokens, 4096);
        assert_eq!(config.providers.ollama.model, "mistral");
        assert_eq!(
            config.providers.ollama.endpoint,
            "http://localhost:11434/api/generate"
        );
        assert_eq!(config.retry.backoff, Backoff::Exponential);
        assert!(config.providers.openai.enabled);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.general.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers.ollama.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.default_provider = Some("skynet".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_key_beats_environment() {
        let mut config = Config::default();
        config.providers.openai.api_key = Some("explicit".to_string());
        config.resolve_api_keys(&Secrets::default(), |_| Some("from-env".to_string()));
        assert_eq!(config.providers.openai.key(), Some("explicit"));
        assert_eq!(config.providers.anthropic.key(), Some("from-env"));
    }

    #[test]
    fn environment_beats_secrets_file() {
        let secrets = Secrets {
            gemini: Some(ApiKeySecret {
                api_key: "from-file".to_string(),
            }),
            anthropic: Some(ApiKeySecret {
                api_key: "file-anthropic".to_string(),
            }),
            ..Default::default()
        };
        let mut config = Config::default();
        config.resolve_api_keys(&secrets, |var| {
            (var == "GOOGLE_API_KEY").then(|| "from-env".to_string())
        });
        assert_eq!(config.providers.gemini.key(), Some("from-env"));
        assert_eq!(config.providers.anthropic.key(), Some("file-anthropic"));
        assert_eq!(config.providers.openai.key(), None);
    }

    #[test]
    fn auto_detect_disabled_ignores_environment() {
        let mut config = Config::default();
        config.general.auto_detect_keys = false;
        config.resolve_api_keys(&Secrets::default(), |_| Some("from-env".to_string()));
        assert_eq!(config.providers.openai.key(), None);
    }
}
