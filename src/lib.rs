//! Huginn - provider-routing orchestrator for LLM backends
//!
//! Routes prompts to one of several interchangeable backends (OpenAI,
//! Google Gemini, Anthropic, a local Ollama daemon) with automatic
//! discovery, an offline fallback responder, a persistent response cache
//! and retry for transient network failures.
//!
//! Failures are values: every query returns a [`QueryResponse`], and a
//! failed one carries an [`ErrorKind`] a presentation layer can turn into a
//! remediation hint.
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::{Huginn, Turn};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let huginn = Huginn::builder()
//!         .openai("sk-your-key")
//!         .cache_path("/tmp/huginn-cache.json")
//!         .build()?;
//!
//!     let history = vec![Turn::user("I'm writing a CLI."), Turn::assistant("Great!")];
//!     let response = huginn
//!         .query_with_cache("How do I parse flags?", &history, true, None)
//!         .await;
//!
//!     match response.error {
//!         None => println!("{}", response.formatted()),
//!         Some(err) => eprintln!("{}: {}", err.message, err.kind.remediation()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod providers;
pub mod telemetry;
pub mod types;

/// Crate version, sent in the HTTP `User-Agent`.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types at crate root
pub use cache::{CacheStats, ResponseCache};
pub use config::{Config, Secrets};
pub use error::{ErrorKind, HuginnError, Result};
pub use gateway::{Huginn, HuginnBuilder};
pub use history::ChatHistory;
pub use providers::{Backoff, Provider, ProviderRegistry, RetryPolicy};
pub use types::{ProviderKind, QueryError, QueryRequest, QueryResponse, Role, Turn, Usage};
