//! Persistent response cache.
//!
//! [`ResponseCache`] maps a request fingerprint to the text of a prior
//! successful response so repeated questions do not pay for a second
//! backend call.
//!
//! # Key
//!
//! `"{provider}_{system_prompt}_{prompt}"` followed by `"_{turn}"` for each
//! of the last [`KEY_HISTORY_TURNS`] history turns, hashed with SHA-256
//! (uppercase hex). Turns older than that window do not affect the key.
//!
//! # Expiry and eviction
//!
//! Entries older than the TTL are misses; the lookup that finds one removes
//! it, and loading from disk sweeps them all. When a store would exceed the
//! capacity, the oldest 20% (by creation time, ties by key) go first.
//!
//! # Persistence
//!
//! With a backing file the cache is loaded at construction and saved after
//! every store and clear (tmp file + rename). A missing or corrupt file
//! yields an empty cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::telemetry;
use crate::types::Turn;
use crate::{HuginnError, Result};

/// History turns that participate in the cache key.
pub const KEY_HISTORY_TURNS: usize = 5;

const FILE_VERSION: u32 = 1;

/// Fingerprint of a request.
pub fn cache_key(provider: &str, system_prompt: &str, prompt: &str, history: &[Turn]) -> String {
    let mut raw = format!("{provider}_{system_prompt}_{prompt}");
    for turn in crate::types::trailing(history, KEY_HISTORY_TURNS) {
        raw.push('_');
        raw.push_str(&turn.to_string());
    }
    hex::encode_upper(Sha256::digest(raw.as_bytes()))
}

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub provider: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// Size summary from [`ResponseCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    /// Approximate payload size (keys, provider names and responses).
    pub approx_bytes: usize,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// Content-addressed response cache with TTL, capacity eviction and
/// optional file persistence.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    path: Option<PathBuf>,
    ttl: chrono::Duration,
    max_entries: usize,
}

impl ResponseCache {
    /// Build from configuration, loading the backing file if one is set.
    pub fn new(config: &CacheConfig) -> Self {
        match config.path.as_deref() {
            Some(path) => Self::open(path, config.ttl(), config.max_entries),
            None => Self::in_memory(config.ttl(), config.max_entries),
        }
    }

    /// A cache without a backing file.
    pub fn in_memory(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            path: None,
            ttl: to_chrono(ttl),
            max_entries: max_entries.max(1),
        }
    }

    /// A cache backed by `path`. Never fails: unreadable or corrupt files
    /// are logged and start an empty cache.
    pub fn open(path: &Path, ttl: Duration, max_entries: usize) -> Self {
        let mut cache = Self::in_memory(ttl, max_entries);
        cache.path = Some(path.to_path_buf());

        let loaded = load_file(path).unwrap_or_default();
        let now = Utc::now();
        let total = loaded.len();
        let fresh: HashMap<String, CacheEntry> = loaded
            .into_iter()
            .filter(|e| !cache.is_expired(e, now))
            .map(|e| (e.key.clone(), e))
            .collect();
        let swept = total - fresh.len();
        if swept > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired")
                .increment(swept as u64);
            debug!(swept, "dropped expired cache entries on load");
        }
        *cache.entries.get_mut().unwrap_or_else(PoisonError::into_inner) = fresh;
        cache
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.created_at) > self.ttl
    }

    /// Cached response text, if a fresh entry exists.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn lookup(
        &self,
        provider: &str,
        prompt: &str,
        system_prompt: &str,
        history: &[Turn],
    ) -> Option<String> {
        let key = cache_key(provider, system_prompt, prompt, history);
        let mut entries = self.lock();
        let hit = match entries.get(&key) {
            Some(entry) if self.is_expired(entry, Utc::now()) => {
                entries.remove(&key);
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired")
                    .increment(1);
                None
            }
            Some(entry) => Some(entry.response.clone()),
            None => None,
        };
        drop(entries);

        if hit.is_some() {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "provider" => provider.to_owned())
                .increment(1);
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "provider" => provider.to_owned())
                .increment(1);
        }
        hit
    }

    /// Cache `response` for the request, evicting old entries if full.
    pub fn store(
        &self,
        provider: &str,
        prompt: &str,
        system_prompt: &str,
        history: &[Turn],
        response: &str,
    ) {
        self.insert_entry(CacheEntry {
            key: cache_key(provider, system_prompt, prompt, history),
            provider: provider.to_string(),
            response: response.to_string(),
            created_at: Utc::now(),
        });
    }

    /// Insert a prepared entry, evicting old entries if full.
    ///
    /// Useful for importing entries with their original timestamps.
    pub fn insert_entry(&self, entry: CacheEntry) {
        let mut entries = self.lock();
        if !entries.contains_key(&entry.key) && entries.len() >= self.max_entries {
            let evicted = evict_oldest(&mut entries, self.max_entries);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "capacity")
                .increment(evicted as u64);
            debug!(evicted, "evicted oldest cache entries");
        }
        entries.insert(entry.key.clone(), entry);
        self.persist(&entries);
    }

    /// Remove every entry (and persist the empty cache).
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether the cache holds an entry under `key`, expired or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let approx_bytes = entries
            .values()
            .map(|e| e.key.len() + e.provider.len() + e.response.len())
            .sum();
        CacheStats {
            entries: entries.len(),
            max_entries: self.max_entries,
            approx_bytes,
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(e) = save_file(path, entries.values()) {
            warn!(path = %path.display(), error = %e, "failed to save response cache");
        }
    }
}

/// Remove the oldest entries so one more fits. Returns how many went.
fn evict_oldest(entries: &mut HashMap<String, CacheEntry>, max_entries: usize) -> usize {
    let count = (max_entries / 5)
        .max(entries.len() + 1 - max_entries)
        .min(entries.len());
    let mut by_age: Vec<(DateTime<Utc>, String)> = entries
        .values()
        .map(|e| (e.created_at, e.key.clone()))
        .collect();
    by_age.sort();
    for (_, key) in by_age.into_iter().take(count) {
        entries.remove(&key);
    }
    count
}

fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}

/// Read entries from `path`. `None` when missing or unreadable.
fn load_file(path: &Path) -> Option<Vec<CacheEntry>> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read response cache");
            return None;
        }
    };
    match serde_json::from_str::<CacheFile>(&content) {
        Ok(file) => Some(file.entries),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt response cache, starting empty");
            None
        }
    }
}

/// Write entries atomically (tmp file + rename).
fn save_file<'a>(path: &Path, entries: impl Iterator<Item = &'a CacheEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = CacheFile {
        version: FILE_VERSION,
        entries: entries.cloned().collect(),
    };
    let json = serde_json::to_string(&file)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(|e| {
        HuginnError::Configuration(format!(
            "failed to write cache file {}: {e}",
            tmp_path.display()
        ))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        HuginnError::Configuration(format!(
            "failed to rename cache file {} → {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;
    Ok(())
}
