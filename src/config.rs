//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Geolocation lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_geo_timeout_ms")]
    pub timeout_ms: u64,
}

/// Self-ping configuration; pinging is off without a url
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/guestbook/guestbook.db".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_geo_endpoint() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_geo_timeout_ms() -> u64 {
    3000
}

fn default_health_interval_secs() -> u64 {
    300
}

fn default_health_timeout_ms() -> u64 {
    10_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_geo_endpoint(),
            timeout_ms: default_geo_timeout_ms(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval_secs: default_health_interval_secs(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl GeoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl HealthConfig {
    /// Never zero; tokio rejects a zero interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./guestbook.yaml (current directory)
    /// 3. ~/.config/guestbook/guestbook.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "guestbook.yaml".to_string(),
            shellexpand::tilde("~/.config/guestbook/guestbook.yaml").to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("reading {}", search_path))?;
                let config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("parsing {}", search_path))?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }
}
