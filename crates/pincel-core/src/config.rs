use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::ai::gemini::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EDIT_MODEL, DEFAULT_IMAGE_MODEL,
};

const APP_DIR: &str = "pincel";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub edit_model: Option<String>,
    pub image_model: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    /// Keep generated images (as data-URIs) in the saved history
    pub persist_images: Option<bool>,
    /// Reuse the last generated image when a text-only prompt follows it
    pub conversational_edit: Option<bool>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_api_key(key: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.api_key = Some(key.to_string());
        config.save()
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    /// API key from `API_KEY`, then `GEMINI_API_KEY`, then the config file
    pub fn resolve_api_key(&self) -> Option<String> {
        ["API_KEY", "GEMINI_API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }

    /// Where the key came from: "env", "config", or None
    pub fn key_source(&self) -> Option<&'static str> {
        let from_env = ["API_KEY", "GEMINI_API_KEY"]
            .iter()
            .any(|var| std::env::var(var).map(|k| !k.trim().is_empty()).unwrap_or(false));
        if from_env {
            Some("env")
        } else if self.api_key.is_some() {
            Some("config")
        } else {
            None
        }
    }

    pub fn resolve_base_url(&self) -> String {
        std::env::var("GEMINI_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn chat_model(&self) -> &str {
        self.chat_model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL)
    }

    pub fn edit_model(&self) -> &str {
        self.edit_model.as_deref().unwrap_or(DEFAULT_EDIT_MODEL)
    }

    pub fn image_model(&self) -> &str {
        self.image_model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    pub fn persist_images(&self) -> bool {
        self.persist_images.unwrap_or(true)
    }

    pub fn conversational_edit(&self) -> bool {
        self.conversational_edit.unwrap_or(true)
    }

    /// Directory holding the chat history and the log file
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join(APP_DIR))
    }

    /// Directory downloaded images are written to
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
