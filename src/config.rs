//! Configuration file handling
//!
//! `config.yaml` is read first, then `config.local.yaml` next to it (when it
//! exists) is merged over it key by key. CLI flags and environment variables
//! are applied on top by `main`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskmate_broker::BrokerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,

    pub rabbitmq: BrokerConfig,

    #[serde(default)]
    pub invite_code: InviteCodeConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sea-orm connection URL
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteCodeConfig {
    /// Pause after a failed lookup or insert before drawing again
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl InviteCodeConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for InviteCodeConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

fn default_retry_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url is required");
        }

        self.rabbitmq
            .validate()
            .context("Invalid rabbitmq configuration")?;

        Ok(())
    }
}

/// `config.yaml` -> `config.local.yaml`
pub fn local_override_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());

    let file_name = match path.extension() {
        Some(ext) => format!("{}.local.{}", stem, ext.to_string_lossy()),
        None => format!("{}.local", stem),
    };

    path.with_file_name(file_name)
}

fn read_yaml(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Recursively overlay `overlay` onto `base`; mappings merge, anything else replaces
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Load `path` plus its local override
pub fn load(path: &Path) -> Result<AppConfig> {
    let mut value = read_yaml(path)?;

    let local = local_override_path(path);
    if local.exists() {
        merge(&mut value, read_yaml(&local)?);
    }

    serde_yaml::from_value(value)
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}
