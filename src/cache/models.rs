//! Memoized model listings.
//!
//! Live listings (Ollama tags, Gemini models) cost a network round trip, so
//! the registry keeps the last answer per provider for a while. A forced
//! refresh skips the cached value and replaces it.

use std::time::Duration;

use moka::sync::Cache;

use crate::types::ProviderKind;

/// Default time a listing stays fresh.
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Per-provider cache of model names.
pub struct ModelListCache {
    entries: Cache<ProviderKind, Vec<String>>,
}

impl ModelListCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(ProviderKind::ALL.len() as u64)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cached listing for a provider.
    pub fn get(&self, kind: ProviderKind) -> Option<Vec<String>> {
        self.entries.get(&kind)
    }

    /// Remember a listing. Empty listings are not kept so the next call
    /// asks again.
    pub fn insert(&self, kind: ProviderKind, models: Vec<String>) {
        if models.is_empty() {
            self.entries.invalidate(&kind);
        } else {
            self.entries.insert(kind, models);
        }
    }

    pub fn invalidate(&self, kind: ProviderKind) {
        self.entries.invalidate(&kind);
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for ModelListCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listing_is_not_cached() {
        let cache = ModelListCache::new();
        cache.insert(ProviderKind::Ollama, vec!["llama3".into()]);
        assert_eq!(cache.get(ProviderKind::Ollama), Some(vec!["llama3".to_string()]));

        cache.insert(ProviderKind::Ollama, Vec::new());
        assert_eq!(cache.get(ProviderKind::Ollama), None);
    }
}
