//! Query request

use super::message::{Turn, trailing};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default cap on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default number of trailing history turns forwarded to a backend.
pub const DEFAULT_HISTORY_WINDOW: usize = 50;

/// A single query, built fresh per call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub prompt: String,
    pub history: Vec<Turn>,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Number of trailing history turns forwarded to the backend.
    pub history_window: usize,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
            system_prompt: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn history(mut self, history: impl IntoIterator<Item = Turn>) -> Self {
        self.history = history.into_iter().collect();
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// History turns a backend should see, oldest first.
    pub fn windowed_history(&self) -> &[Turn] {
        trailing(&self.history, self.history_window)
    }
}
