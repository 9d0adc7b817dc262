//! Offline canned responder.
//!
//! Answers from a small table of topics without touching the network. The
//! prompt is lowercased and each topic scored by how many of its keywords
//! appear in it; the best-scoring topic answers, ties going to the topic
//! listed first. Prompts matching nothing get the `default` topic, empty
//! prompts the `greeting` topic.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use tracing::{debug, warn};

use super::traits::Provider;
use crate::config::FallbackConfig;
use crate::types::{ProviderKind, QueryRequest, QueryResponse};
use crate::{HuginnError, Result};

const GREETING: &str = "greeting";
const DEFAULT: &str = "default";

/// One answerable topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    /// Lowercase substrings that count towards this topic.
    pub keywords: Vec<String>,
    pub responses: Vec<String>,
}

/// Ordered topic table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTable {
    topics: Vec<Topic>,
}

fn topic(name: &str, keywords: &[&str], responses: &[&str]) -> Topic {
    Topic {
        name: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        responses: responses.iter().map(|r| r.to_string()).collect(),
    }
}

impl ResponseTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        let topics = vec![
            topic(
                GREETING,
                &["hello", "hi ", "hey", "good morning", "good evening", "greetings"],
                &[
                    "Hello! I'm running in offline demo mode. Configure an API key or start a local Ollama daemon for full answers.",
                    "Hi there! This is the offline assistant. I can give short canned answers until a model backend is available.",
                ],
            ),
            topic(
                "engine",
                &["engine", "game", "scene", "editor", "project"],
                &[
                    "Game engines organise a project into scenes made of objects with attached components. Start from a small scene and add behaviour one component at a time.",
                    "Keep scenes small and focused, move shared settings into reusable assets, and profile early so performance problems surface while they are cheap to fix.",
                ],
            ),
            topic(
                "code",
                &["code", "function", "method", "class", "program", "snippet"],
                &[
                    "Here's a minimal pattern to start from:\n\n```rust\nfn main() {\n    let items = vec![1, 2, 3];\n    let total: i32 = items.iter().sum();\n    println!(\"total = {total}\");\n}\n```",
                    "Break the problem into small functions with one responsibility each, give them descriptive names, and test them in isolation before wiring them together.",
                ],
            ),
            topic(
                "script",
                &["script", "component", "behaviour", "behavior", "implement"],
                &[
                    "A typical behaviour script initialises state once, updates it every frame, and reacts to events such as collisions. Keep per-frame work small.",
                    "Expose tunable values as fields rather than hard-coding them, so they can be adjusted without editing the script.",
                ],
            ),
            topic(
                "errors",
                &["error", "bug", "debug", "fix", "exception", "crash", "problem"],
                &[
                    "Read the first error in the log, not the last: later errors are often consequences. Reproduce the problem in the smallest case you can.",
                    "Check for missing references and uninitialised values first; they cause most runtime exceptions. Add logging around the failing call to narrow it down.",
                ],
            ),
            topic(
                "2d",
                &["2d", "sprite", "platformer", "tilemap", "pixel"],
                &[
                    "For 2D games use sprites with a consistent pixels-per-unit value, tilemaps for level layout, and 2D physics colliders for interaction.",
                    "A platformer needs a ground check, coyote time and a jump buffer to feel responsive. Tune gravity separately for rising and falling.",
                ],
            ),
            topic(
                "3d",
                &["3d", "mesh", "model", "camera", "lighting", "shader"],
                &[
                    "For 3D scenes keep mesh polygon counts reasonable, bake static lighting where you can, and use level-of-detail models for distant objects.",
                    "A third-person camera usually follows a pivot behind the player with smoothing, and pulls in when geometry blocks the view.",
                ],
            ),
            topic(
                "setup",
                &["api", "key", "openai", "gemini", "claude", "ollama", "setup", "install", "free"],
                &[
                    "To leave demo mode, set OPENAI_API_KEY, GEMINI_API_KEY or ANTHROPIC_API_KEY, or install Ollama and run `ollama pull llama3` for a free local model.",
                    "API keys can go in ~/.huginn/secrets.toml (mode 0600) or environment variables. A running Ollama daemon is detected automatically.",
                ],
            ),
            topic(
                DEFAULT,
                &[],
                &[
                    "I'm in offline demo mode, so my answers are limited. Connect a model backend for a complete answer to that question.",
                    "That's a good question, but it needs a real model. Configure a cloud API key or start a local Ollama daemon and ask again.",
                ],
            ),
        ];
        Self { topics }
    }

    /// Built-in table merged with a JSON file of `{"topic": ["response", ...]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut table = Self::builtin();
        table.merge_json(&json)?;
        Ok(table)
    }

    /// Merge a JSON object of topic → responses.
    ///
    /// Known topics get their responses replaced; new topics are appended
    /// with their own name as the only keyword. Empty lists are ignored.
    pub fn merge_json(&mut self, json: &str) -> Result<()> {
        let extra: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        for (name, responses) in extra {
            if responses.is_empty() {
                continue;
            }
            let name = name.to_lowercase();
            match self.topics.iter_mut().find(|t| t.name == name) {
                Some(existing) => existing.responses = responses,
                None => self.topics.push(Topic {
                    keywords: vec![name.clone()],
                    name,
                    responses,
                }),
            }
        }
        Ok(())
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    fn named(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// Topic that answers `prompt`.
    pub fn select(&self, prompt: &str) -> Option<&Topic> {
        let normalized = prompt.trim().to_lowercase();
        if normalized.is_empty() {
            return self.named(GREETING);
        }
        // Pad so keywords with boundary spaces ("hi ") match at the edges.
        let padded = format!(" {normalized} ");

        let mut best: Option<(&Topic, usize)> = None;
        for topic in &self.topics {
            let score = topic
                .keywords
                .iter()
                .filter(|k| padded.contains(k.as_str()))
                .count();
            if score > 0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((topic, score));
            }
        }
        best.map(|(t, _)| t).or_else(|| self.named(DEFAULT))
    }

    /// A response for `prompt`, picked at random within the selected topic.
    pub fn respond(&self, prompt: &str) -> Option<String> {
        self.select(prompt)?
            .responses
            .choose(&mut rand::rng())
            .cloned()
    }
}

impl Default for ResponseTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Provider that answers from a [`ResponseTable`]. Never fails.
pub struct FallbackProvider {
    enabled: bool,
    table: ResponseTable,
    delay: Duration,
}

impl FallbackProvider {
    /// Build from configuration. An unreadable responses file is logged and
    /// the built-in table used instead.
    pub fn new(config: &FallbackConfig) -> Self {
        let table = match config.responses_path.as_deref() {
            Some(path) => ResponseTable::load(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load fallback responses");
                ResponseTable::builtin()
            }),
            None => ResponseTable::builtin(),
        };
        Self {
            enabled: config.enabled,
            table,
            delay: Duration::from_millis(config.delay_ms),
        }
    }

    pub fn with_table(table: ResponseTable) -> Self {
        Self {
            enabled: true,
            table,
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fallback
    }

    fn is_configured(&self) -> bool {
        self.enabled
    }

    fn model(&self) -> Option<&str> {
        Some("demo")
    }

    async fn try_query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = self
            .table
            .respond(&request.prompt)
            .ok_or_else(|| HuginnError::Configuration("fallback table has no responses".into()))?;
        debug!("answered from fallback table");
        Ok(QueryResponse::success(content)
            .from_fallback()
            .with_model("demo")
            .with_provider(self.name()))
    }

    async fn list_models(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prompt_greets() {
        let table = ResponseTable::builtin();
        assert_eq!(table.select("   ").unwrap().name, GREETING);
    }

    #[test]
    fn highest_score_wins() {
        let table = ResponseTable::builtin();
        // "error" + "fix" + "crash" outscore "code"
        let topic = table.select("How do I fix this crash error in my code?").unwrap();
        assert_eq!(topic.name, "errors");
    }

    #[test]
    fn no_match_uses_default() {
        let table = ResponseTable::builtin();
        assert_eq!(table.select("qwertyuiop").unwrap().name, DEFAULT);
    }

    #[test]
    fn merge_replaces_and_appends() {
        let mut table = ResponseTable::builtin();
        table
            .merge_json(r#"{"default": ["custom default"], "weather": ["It is sunny."], "empty": []}"#)
            .unwrap();
        assert_eq!(table.respond("zzz").as_deref(), Some("custom default"));
        assert_eq!(table.respond("what's the weather").as_deref(), Some("It is sunny."));
        assert!(table.topics().iter().all(|t| t.name != "empty"));
    }

    #[test]
    fn response_comes_from_selected_topic() {
        let table = ResponseTable::builtin();
        let answer = table.respond("tell me about sprites in a 2d platformer").unwrap();
        let topic = table.select("tell me about sprites in a 2d platformer").unwrap();
        assert!(topic.responses.contains(&answer));
    }
}
