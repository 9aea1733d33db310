use crate::accumulate::AccumulationPolicy;
use crate::bing::SEARCH_ENDPOINT;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV_VAR: &str = "IMGHARVEST_CONFIG";
pub const BIND_ENV_VAR: &str = "IMGHARVEST_BIND";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub crawler: CrawlerConfig,
    pub policy: AccumulationPolicy,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Result-page endpoint queried with `q`, `first` and `count`.
    pub search_endpoint: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Results asked of the provider per search page.
    pub page_size: usize,
    /// Pause between search page requests.
    pub delay_ms: u64,
    pub downloader_threads: usize,
    pub min_image_bytes: u64,
    pub max_image_bytes: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            search_endpoint: SEARCH_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 25,
            page_size: 35,
            delay_ms: 350,
            downloader_threads: 6,
            min_image_bytes: 1_024,
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Finished archives kept in memory waiting to be downloaded.
    pub max_ready_archives: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_ready_archives: 4,
        }
    }
}

/// Reads settings from `path`; a missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

/// Settings as selected by the process environment: the file named by
/// `IMGHARVEST_CONFIG` if set, with `IMGHARVEST_BIND` overriding the address.
pub fn load_settings_from_env() -> Result<Settings> {
    let mut settings = match env_value(CONFIG_ENV_VAR) {
        Some(path) => load_settings(Path::new(&path))?,
        None => Settings::default(),
    };
    if let Some(bind) = env_value(BIND_ENV_VAR) {
        settings.server.bind_addr = bind;
    }
    Ok(settings)
}

fn env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
