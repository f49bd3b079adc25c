use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";
/// Title new sessions are created with.
///
/// The chat service only retitles a session from its first message while
/// the session still carries this exact title.
pub const DEFAULT_SESSION_TITLE: &str = "Percakapan Baru";

/// Environment variables consulted for the backend URL, in order
const BACKEND_URL_VARS: &[&str] = &["CHATBOT_BACKEND_URL", "REACT_APP_BACKEND_URL"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub default_session_title: String,
    pub download_dir: Option<PathBuf>,
    pub use_mock: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            backend_url: None,
            default_session_title: DEFAULT_SESSION_TITLE.to_string(),
            download_dir: None,
            use_mock: false,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
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
        self.save_to(&Self::config_path()?)
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

    /// Base URL of the chat service: CLI flag, then environment, then file, then default
    pub fn backend_url(&self, cli_override: Option<&str>) -> String {
        if let Some(url) = cli_override {
            return url.to_string();
        }
        BACKEND_URL_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .or_else(|| self.backend_url.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
    }

    /// The `/api` root every request is made against
    pub fn api_base(&self, cli_override: Option<&str>) -> String {
        api_base_for(&self.backend_url(cli_override))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("chatbot-tui"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

pub fn api_base_for(backend_url: &str) -> String {
    format!("{}/api", backend_url.trim_end_matches('/'))
}
