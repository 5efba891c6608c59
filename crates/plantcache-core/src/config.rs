//! Application configuration management.
//!
//! This module loads the application configuration:
//! the remote database URL, where the local store lives, and sync tuning.
//!
//! Configuration is stored at `~/.config/plantcache/config.json`. The
//! `PLANTCACHE_API_URL` and `PLANTCACHE_DB` environment variables override
//! the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::REQUEST_TIMEOUT_SECS;

/// Application name used for config/data directory paths
const APP_NAME: &str = "plantcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Database file name inside the data directory
const DATABASE_FILE: &str = "plants.db";

const API_URL_ENV: &str = "PLANTCACHE_API_URL";
const DATABASE_ENV: &str = "PLANTCACHE_DB";

/// Default upper bound on a snapshot fetch during sync.
const DEFAULT_SYNC_DEADLINE_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub database_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub sync_deadline_secs: u64,
    /// Replace the table in one transaction instead of clear-then-insert.
    pub atomic_sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            database_path: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            sync_deadline_secs: DEFAULT_SYNC_DEADLINE_SECS,
            atomic_sync: false,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_base_url = Some(url);
        }
        if let Some(db) = lookup(DATABASE_ENV).filter(|v| !v.is_empty()) {
            self.database_path = Some(PathBuf::from(db));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the local database and session file.
    pub fn data_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match self.database_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join(DATABASE_FILE)),
        }
    }

    pub fn api_base_url(&self) -> Result<&str> {
        self.api_base_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No API URL configured (set {} or api_base_url)", API_URL_ENV)
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_deadline(&self) -> Duration {
        Duration::from_secs(self.sync_deadline_secs)
    }
}
