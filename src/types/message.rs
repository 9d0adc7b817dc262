//! Conversation turns

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a turn, as understood by chat backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Any other sender (system notices, tool output). Not forwarded to backends.
    Other,
}

/// One prior turn of a conversation.
///
/// Turns are persisted and displayed as `"sender: text"` lines; the sender
/// is kept verbatim so a history written by a presentation layer round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub sender: String,
    pub text: String,
}

impl Turn {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// A turn authored by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new("User", text)
    }

    /// A turn authored by the model.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new("AI", text)
    }

    /// Parse a `"sender: text"` line. A line without a separator is treated
    /// as a sender with empty text.
    pub fn parse(line: &str) -> Self {
        match line.split_once(": ") {
            Some((sender, text)) => Self::new(sender, text),
            None => Self::new(line, ""),
        }
    }

    /// Backend role derived from the sender label (case-insensitive).
    pub fn role(&self) -> Role {
        match self.sender.to_lowercase().as_str() {
            "user" => Role::User,
            "ai" | "assistant" | "model" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.text)
    }
}

impl From<&str> for Turn {
    fn from(line: &str) -> Self {
        Self::parse(line)
    }
}

/// The trailing `window` turns of `history`. Older turns are dropped.
pub fn trailing(history: &[Turn], window: usize) -> &[Turn] {
    &history[history.len().saturating_sub(window)..]
}
