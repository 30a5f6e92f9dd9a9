//! Configuration management for Postpilot

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub triggers: TriggersConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    pub mastodon: Option<PlatformConfig>,
    pub bluesky: Option<PlatformConfig>,
    pub linkedin: Option<PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Cadences for the periodic triggers, as humantime strings ("1h", "30m").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggersConfig {
    #[serde(default = "default_fetch_cadence")]
    pub fetch: String,
    #[serde(default = "default_generate_cadence")]
    pub generate: String,
    #[serde(default = "default_publish_cadence")]
    pub publish: String,
    #[serde(default = "default_expire_cadence")]
    pub expire: String,
}

fn default_fetch_cadence() -> String {
    "4h".to_string()
}

fn default_generate_cadence() -> String {
    "6h".to_string()
}

fn default_publish_cadence() -> String {
    "1h".to_string()
}

fn default_expire_cadence() -> String {
    "1h".to_string()
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            fetch: default_fetch_cadence(),
            generate: default_generate_cadence(),
            publish: default_publish_cadence(),
            expire: default_expire_cadence(),
        }
    }
}

impl TriggersConfig {
    pub fn fetch_interval(&self) -> Result<Duration> {
        parse_cadence("triggers.fetch", &self.fetch)
    }

    pub fn generate_interval(&self) -> Result<Duration> {
        parse_cadence("triggers.generate", &self.generate)
    }

    pub fn publish_interval(&self) -> Result<Duration> {
        parse_cadence("triggers.publish", &self.publish)
    }

    pub fn expire_interval(&self) -> Result<Duration> {
        parse_cadence("triggers.expire", &self.expire)
    }
}

fn parse_cadence(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_workers")]
    pub workers: usize,
}

fn default_publish_workers() -> usize {
    crate::orchestrator::DEFAULT_PUBLISH_WORKERS
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            workers: default_publish_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub enabled: bool,
    #[serde(default = "default_adapter")]
    pub adapter: String,
}

fn default_adapter() -> String {
    "mock".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/postpilot/posts.db".to_string(),
            },
            triggers: TriggersConfig::default(),
            publish: PublishConfig::default(),
            mastodon: None,
            bluesky: None,
            linkedin: None,
        }
    }

    /// Per-platform section, if configured.
    pub fn platform(&self, platform: Platform) -> Option<&PlatformConfig> {
        match platform {
            Platform::Mastodon => self.mastodon.as_ref(),
            Platform::Bluesky => self.bluesky.as_ref(),
            Platform::Linkedin => self.linkedin.as_ref(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTPILOT_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postpilot").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("postpilot"))
}
