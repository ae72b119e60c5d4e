//! Configuration
//!
//! Settings are read from a TOML file (`--config`, or
//! `<config dir>/lifelog-provision/config.toml` when present). Every field has
//! a default, so a missing file is not an error. Credentials are never read
//! from here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::resilience::{ConcurrencyConfig, ResilienceConfig, RetryConfig};

const APP_DIR: &str = "lifelog-provision";
const CONFIG_FILE: &str = "config.toml";
const MANIFEST_FILE: &str = "manifest.json";

/// Environment variable holding the integration key
pub const API_KEY_ENV: &str = "LIFELOG_NOTION_KEY";
/// Environment variable holding the parent container id
pub const PARENT_ID_ENV: &str = "LIFELOG_PARENT_ID";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub api: ApiSettings,
    pub retry: RetrySettings,
    pub concurrency: ConcurrencySettings,
    pub manifest: ManifestSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub notion_version: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com/v1".to_string(),
            notion_version: "2022-06-28".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    pub enabled: bool,
    pub max_concurrent_requests: usize,
    pub max_parallel_creates: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_requests: 3,
            max_parallel_creates: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSettings {
    /// Where the provisioning manifest is kept between runs
    pub path: Option<PathBuf>,
}

impl ProvisionConfig {
    /// Load from an explicit path (must exist) or the default location (optional)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    log::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Configured manifest path, or `<data dir>/lifelog-provision/manifest.json`
    pub fn manifest_path(&self) -> PathBuf {
        if let Some(path) = &self.manifest.path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join(MANIFEST_FILE))
            .unwrap_or_else(|| PathBuf::from(MANIFEST_FILE))
    }

    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryConfig {
                max_attempts: self.retry.max_attempts.max(1),
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                backoff_multiplier: self.retry.backoff_multiplier,
                jitter: self.retry.jitter,
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_requests: self.concurrency.max_concurrent_requests.max(1),
                max_parallel_creates: self.concurrency.max_parallel_creates.max(1),
                enabled: self.concurrency.enabled,
            },
        }
    }
}
