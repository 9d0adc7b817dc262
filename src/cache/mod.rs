//! Caching subsystem.
//!
//! Two independent caches:
//!
//! - [`ResponseCache`]: persistent, content-addressed store of successful
//!   responses with TTL and capacity eviction. Consulted by the
//!   orchestrator before any backend call.
//!
//! - [`ModelListCache`]: short-lived memo of per-provider model listings,
//!   owned by the [`ProviderRegistry`](crate::providers::ProviderRegistry).

pub mod models;
pub mod response;

pub use models::ModelListCache;
pub use response::{CacheEntry, CacheStats, KEY_HISTORY_TURNS, ResponseCache, cache_key};
