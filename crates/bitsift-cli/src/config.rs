//! Configuration and path resolution for the CLI.
//!
//! Settings are layered, later layers winning:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, else `bitsift.toml` in the data directory)
//! 3. Environment variables
//! 4. Command-line flags

use anyhow::{anyhow, Context, Result};
use bitsift_core::config::EngineConfig;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the data directory when `--config` is absent.
const CONFIG_FILENAME: &str = "bitsift.toml";

/// Default inbox directory name, relative to the data directory.
const INBOX_DIRNAME: &str = "inbox";

pub const DATA_DIR_ENV: &str = "BITSIFT_DATA_DIR";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const EMBED_MODEL_ENV: &str = "BITSIFT_EMBED_MODEL";
pub const CHAT_MODEL_ENV: &str = "BITSIFT_CHAT_MODEL";
pub const INBOX_DIR_ENV: &str = "BITSIFT_INBOX_DIR";

/// Endpoint and model names of the OpenAI-compatible API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    /// Must produce vectors of the engine's `dimension`
    pub embed_model: String,
    pub chat_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            embed_model: "nomic-embed-text-v1.5".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Everything the CLI needs to start an engine.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub openai: OpenAiSettings,
    /// Directory the inbox crawler reads from
    pub inbox_dir: Option<PathBuf>,
}

impl Settings {
    /// Parses a TOML settings file body.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid settings file")
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV) {
            self.openai.api_key = key;
        }
        if let Some(url) = lookup(BASE_URL_ENV) {
            self.openai.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup(EMBED_MODEL_ENV) {
            self.openai.embed_model = model;
        }
        if let Some(model) = lookup(CHAT_MODEL_ENV) {
            self.openai.chat_model = model;
        }
        if let Some(dir) = lookup(INBOX_DIR_ENV) {
            self.inbox_dir = Some(PathBuf::from(dir));
        }
    }

    /// Anchors relative paths at `data_dir` and fills in the inbox default.
    pub fn resolve_paths(&mut self, data_dir: &Path) {
        if self.engine.database_path.is_relative() {
            self.engine.database_path = data_dir.join(&self.engine.database_path);
        }
        let inbox = self
            .inbox_dir
            .take()
            .unwrap_or_else(|| PathBuf::from(INBOX_DIRNAME));
        self.inbox_dir = Some(if inbox.is_relative() {
            data_dir.join(inbox)
        } else {
            inbox
        });
    }

    /// Inbox directory; only meaningful after [`resolve_paths`](Self::resolve_paths).
    pub fn inbox_dir(&self) -> PathBuf {
        self.inbox_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(INBOX_DIRNAME))
    }
}

/// Returns the data directory.
///
/// Resolution order: `--data-dir`, `$BITSIFT_DATA_DIR`, then the platform
/// location:
/// - macOS: `~/Library/Application Support/dev.bitsift.Bitsift/`
/// - Linux: `~/.local/share/bitsift/`
/// - Windows: `%APPDATA%\bitsift\Bitsift\data\`
pub fn get_data_dir(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.clone());
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    ProjectDirs::from("dev", "bitsift", "Bitsift")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Loads settings from every layer.
pub fn load_settings(data_dir: Option<&PathBuf>, config_file: Option<&PathBuf>) -> Result<Settings> {
    let data_dir = get_data_dir(data_dir)?;

    let mut settings = match config_file {
        Some(path) => read_settings_file(path)?,
        None => {
            let default_path = data_dir.join(CONFIG_FILENAME);
            if default_path.exists() {
                read_settings_file(&default_path)?
            } else {
                Settings::default()
            }
        }
    };

    settings.apply_env(|key| std::env::var(key).ok());
    settings.resolve_paths(&data_dir);
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<Settings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    Settings::from_toml_str(&text).with_context(|| format!("In {}", path.display()))
}
