// DocRoute Client Configuration
// Persistent settings stored as JSON in the user config directory

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::http_retry::HttpRetryConfig;

/// Environment override for the backend base URL
pub const API_URL_ENV: &str = "DOCROUTE_API_URL";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const CONFIG_FILENAME: &str = "config.json";
const MIN_REFRESH_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL (e.g., https://docroute.example.com)
    pub api_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Where share downloads and received documents are written
    pub download_dir: PathBuf,
    /// Background refresh period of the analytics dashboard
    pub analytics_refresh_secs: u64,
    /// Background refresh period of the document code history
    pub doc_code_refresh_secs: u64,
    /// Retry policy for idempotent reads
    pub retry: HttpRetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let download_dir = dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));

        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 15,
            download_dir,
            analytics_refresh_secs: 60,
            doc_code_refresh_secs: 30,
            retry: HttpRetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn analytics_refresh(&self) -> Duration {
        Duration::from_secs(self.analytics_refresh_secs)
    }

    pub fn doc_code_refresh(&self) -> Duration {
        Duration::from_secs(self.doc_code_refresh_secs)
    }

    /// Apply `DOCROUTE_API_URL` if set and non-empty
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.api_url = url.to_string();
            }
        }
    }
}

/// Directory holding config.json and session.json
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("docroute")
}

fn get_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILENAME)
}

/// Load configuration from the default location, then apply the environment.
pub fn load_config() -> ClientConfig {
    let mut config = load_config_from(&get_config_path());
    config.apply_env();
    config
}

/// Load configuration from `path`, falling back to defaults on any problem.
pub fn load_config_from(path: &Path) -> ClientConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Failed to parse config {:?}: {}", path, e),
            },
            Err(e) => tracing::warn!("Failed to read config {:?}: {}", path, e),
        }
    }

    ClientConfig::default()
}

pub fn save_config(config: &ClientConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Serialization(e.to_string()))?;
    fs::write(path, content)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Validate client configuration
pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let url = url::Url::parse(&config.api_url)
        .map_err(|e| ConfigError::Invalid(format!("api_url '{}': {}", config.api_url, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "api_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ConfigError::Invalid("api_url must include a host".to_string()));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Invalid("timeout_secs must be greater than 0".to_string()));
    }

    if config.analytics_refresh_secs < MIN_REFRESH_SECS
        || config.doc_code_refresh_secs < MIN_REFRESH_SECS
    {
        return Err(ConfigError::Invalid(format!(
            "refresh intervals must be at least {}s",
            MIN_REFRESH_SECS
        )));
    }

    Ok(())
}
