//! Chat history file.
//!
//! A JSON array of `"sender: text"` lines, capped to the newest
//! `max_entries`. A file that does not parse is renamed to
//! `<file>.corrupted_<YYYYMMDDHHMMSS>` and a fresh history started.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, error, warn};

use crate::types::{Turn, trailing};
use crate::{HuginnError, Result};

/// Cap used when a non-positive maximum is configured.
const FALLBACK_MAX_ENTRIES: usize = 20;

/// Persistent chat history.
pub struct ChatHistory {
    path: PathBuf,
    max_entries: usize,
}

impl ChatHistory {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: if max_entries > 0 {
                max_entries
            } else {
                FALLBACK_MAX_ENTRIES
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Load the history. Missing, empty or unreadable files give an empty
    /// history; corrupted files are backed up first.
    pub fn load(&self) -> Vec<Turn> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no chat history yet");
            return Vec::new();
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read chat history");
                return Vec::new();
            }
        };
        if content.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Option<Vec<String>>>(&content) {
            Ok(lines) => lines
                .unwrap_or_default()
                .iter()
                .map(|line| Turn::parse(line))
                .collect(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt chat history, backing it up");
                self.back_up_corrupted();
                Vec::new()
            }
        }
    }

    fn back_up_corrupted(&self) {
        let mut backup = self.path.clone().into_os_string();
        backup.push(format!(".corrupted_{}", Local::now().format("%Y%m%d%H%M%S")));
        let backup = PathBuf::from(backup);
        match fs::rename(&self.path, &backup) {
            Ok(()) => debug!(backup = %backup.display(), "corrupted chat history backed up"),
            Err(e) => error!(path = %self.path.display(), error = %e, "failed to back up corrupted chat history"),
        }
    }

    /// Save the newest `max_entries` turns.
    pub fn save(&self, history: &[Turn]) -> Result<()> {
        let lines: Vec<String> = trailing(history, self.max_entries)
            .iter()
            .map(Turn::to_string)
            .collect();
        let json = serde_json::to_string_pretty(&lines)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json).map_err(|e| {
            HuginnError::Configuration(format!(
                "failed to save chat history {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Append turns to the stored history and save it. Returns the capped
    /// history as saved.
    pub fn append(&self, turns: impl IntoIterator<Item = Turn>) -> Result<Vec<Turn>> {
        let mut history = self.load();
        history.extend(turns);
        let start = history.len().saturating_sub(self.max_entries);
        history.drain(..start);
        self.save(&history)?;
        Ok(history)
    }

    /// Delete the history file.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_max_uses_default_cap() {
        let history = ChatHistory::new("unused.json", 0);
        assert_eq!(history.max_entries(), FALLBACK_MAX_ENTRIES);
    }
}
