//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, refresh timing, and last used username.
//!
//! Configuration is stored at `~/.config/daybook/config.json`. The
//! `DAYBOOK_API_BASE` environment variable overrides the stored base URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::http::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::api::journal::DEFAULT_TIMEZONE;
use crate::auth::session::DEFAULT_REFRESH_LEAD_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "daybook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base`
pub const API_BASE_ENV: &str = "DAYBOOK_API_BASE";

pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub last_username: Option<String>,
    pub timezone: String,
    pub refresh_lead_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            last_username: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            refresh_lead_secs: DEFAULT_REFRESH_LEAD_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_api_base_override(std::env::var(API_BASE_ENV).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Record the last signed-in user in the stored config. Only that field
    /// changes; runtime overrides (env, flags) never reach the file.
    pub fn remember_username(username: &str) -> Result<()> {
        Self::remember_username_at(&Self::config_path()?, username)
    }

    pub fn remember_username_at(path: &Path, username: &str) -> Result<()> {
        let mut stored = Self::load_from(path)?;
        stored.last_username = Some(username.to_string());
        stored.save_to(path)
    }

    fn apply_api_base_override(&mut self, api_base: Option<String>) {
        if let Some(api_base) = api_base.filter(|v| !v.trim().is_empty()) {
            self.api_base = api_base.trim().to_string();
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for rolling log files
    pub fn log_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("logs"))
    }

    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
