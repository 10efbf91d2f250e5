use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};

pub const APP_DIR_NAME: &str = "ds-assistant";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Paths the mutation engine refuses to write, rename, or delete no matter
/// what the model asks for. Matched against the exact trimmed tag argument.
pub const PROTECTED_PATHS: &[&str] = &[".env", "ds_history.json", ".git"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub models: ModelConfig,
    /// Extra protected paths on top of the built-in set.
    #[serde(default)]
    pub protect: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { window: crate::session::DEFAULT_WINDOW }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub max_entries: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_depth: 4, max_entries: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub primary: String,
    pub backup: String,
    pub speed: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary: crate::llm::PRIMARY_MODEL.to_string(),
            backup: crate::llm::BACKUP_MODEL.to_string(),
            speed: crate::llm::SPEED_MODEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Built-in deny-list plus config additions.
    pub fn protected_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = PROTECTED_PATHS.iter().map(|s| s.to_string()).collect();
        for extra in &self.protect {
            let extra = extra.trim();
            if !extra.is_empty() && !out.iter().any(|p| p == extra) {
                out.push(extra.to_string());
            }
        }
        out
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let base = config_dir().context("unable to resolve OS config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn load_config_if_exists(path: &PathBuf) -> Result<Option<AppConfig>> {
    if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file: {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&text).context("parsing config TOML")?;
        Ok(Some(cfg))
    } else {
        Ok(None)
    }
}

/// Effective config: the file if present, defaults otherwise.
pub fn load_config() -> Result<AppConfig> {
    let path = default_config_path()?;
    Ok(load_config_if_exists(&path)?.unwrap_or_default())
}

/// Provider secrets, read once from the process environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Ordered Gemini keys; index 0 gets the primary model tier.
    pub gemini_keys: Vec<String>,
    pub groq_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let gemini_keys = env::var("GEMINI_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let groq_key = env::var("GROQ_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self { gemini_keys, groq_key }
    }
}
