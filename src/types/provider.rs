//! Provider identity

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::HuginnError;

/// The closed set of backends huginn can talk to.
///
/// Adding a backend means adding a variant here; every `match` over the
/// kind (construction, display names, model tables) then has to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local Ollama daemon.
    Ollama,
    /// OpenAI chat completions.
    OpenAi,
    /// Google Gemini `generateContent`.
    Gemini,
    /// Anthropic messages.
    Anthropic,
    /// Built-in canned responder. Never touches the network.
    Fallback,
}

impl ProviderKind {
    /// Every kind, in best-available priority order.
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Ollama,
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Anthropic,
        ProviderKind::Fallback,
    ];

    /// Name shown to users and stored in cache keys.
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::Anthropic => "Anthropic Claude",
            ProviderKind::Fallback => "Demo",
        }
    }

    /// Parse a user-supplied provider name (case-insensitive, aliases allowed).
    ///
    /// Returns `None` for unknown names and for the "auto" pseudo-provider.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ollama" | "local" => Some(ProviderKind::Ollama),
            "openai" => Some(ProviderKind::OpenAi),
            "gemini" | "google" | "google gemini" => Some(ProviderKind::Gemini),
            "anthropic" | "claude" | "anthropic claude" => Some(ProviderKind::Anthropic),
            "demo" | "fallback" => Some(ProviderKind::Fallback),
            _ => None,
        }
    }

    /// Whether `name` selects best-available routing rather than a provider.
    pub fn is_auto(name: &str) -> bool {
        let name = name.trim();
        name.is_empty() || name.eq_ignore_ascii_case("auto")
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| HuginnError::Configuration(format!("unknown provider '{s}'")))
    }
}
