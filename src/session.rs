use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// History lives next to the project the assistant is working on.
pub const HISTORY_FILE: &str = "ds_history.json";

/// Maximum number of individual turns kept (a user/model exchange is two).
pub const DEFAULT_WINDOW: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: "user".into(), text: text.into(), timestamp: Some(Utc::now()) }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: "model".into(), text: text.into(), timestamp: Some(Utc::now()) }
    }
}

pub fn history_path(root: &Path) -> PathBuf {
    root.join(HISTORY_FILE)
}

/// Load the conversation history, or an empty list when the file is missing.
/// A file that no longer parses is treated as empty rather than fatal.
pub fn load(path: &Path) -> Result<Vec<Turn>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading history file: {}", path.display()))?;
    match serde_json::from_str::<Vec<Turn>>(&text) {
        Ok(turns) => Ok(turns),
        Err(e) => {
            eprintln!("history file unreadable ({}); starting fresh", e);
            Ok(Vec::new())
        }
    }
}

/// Overwrite the whole history file with the given turns.
pub fn save(path: &Path, turns: &[Turn]) -> Result<()> {
    let text = serde_json::to_string(turns).context("serializing history")?;
    fs::write(path, text).with_context(|| format!("writing history file: {}", path.display()))?;
    Ok(())
}

/// Append the latest user/model pair and drop the oldest turns beyond the window.
pub fn append_exchange(turns: &mut Vec<Turn>, user_text: &str, model_text: &str, window: usize) {
    turns.push(Turn::user(user_text));
    turns.push(Turn::model(model_text));
    truncate_to_window(turns, window);
}

pub fn truncate_to_window(turns: &mut Vec<Turn>, window: usize) {
    if turns.len() > window {
        turns.drain(..turns.len() - window);
    }
}
